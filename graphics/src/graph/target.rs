//! Attachment operations and layouts.

/// Operation to perform when loading an attachment at the start of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Load the existing contents of the attachment.
    #[default]
    Load,
    /// Clear the attachment.
    Clear,
    /// Don't care about the existing contents (may be undefined).
    DontCare,
}

/// Operation to perform when storing an attachment at the end of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Store the attachment contents for later use.
    #[default]
    Store,
    /// Don't care about storing (contents may be discarded).
    DontCare,
}

/// Image layout an attachment is in at a pass boundary or inside the subpass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentLayout {
    /// Readable from shaders; the layout dynamic textures rest in between passes.
    ShaderReadOnly,
    /// Writable as a colour attachment.
    ColorAttachment,
}
