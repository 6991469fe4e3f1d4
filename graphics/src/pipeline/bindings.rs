//! Merging reflected bindings into per-set layouts.

use std::collections::BTreeMap;

use crate::error::ConfigError;
use crate::shader::{DescriptorType, ReflectedBinding, ShaderStage, ShaderStageFlags};

/// A named resource binding merged across every stage of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceBinding {
    /// Name of the uniform, texture or sampler.
    pub name: String,
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor type.
    pub descriptor_type: DescriptorType,
    /// Array size.
    pub count: u32,
    /// Every stage that uses the resource.
    pub stages: ShaderStageFlags,
}

impl ResourceBinding {
    fn describe(&self) -> String {
        format!(
            "set {} binding {} {:?}[{}]",
            self.set, self.binding, self.descriptor_type, self.count
        )
    }

    fn same_slot(&self, other: &ReflectedBinding) -> bool {
        self.set == other.set
            && self.binding == other.binding
            && self.descriptor_type == other.descriptor_type
            && self.count == other.count
    }
}

/// Bindings of one pipeline keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingSet {
    bindings: BTreeMap<String, ResourceBinding>,
}

impl BindingSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the bindings of one stage.
    ///
    /// A name already seen must come with an identical (set, binding, type,
    /// count) tuple; its stage set then grows to include `stage`.
    pub fn merge(
        &mut self,
        pipeline: &str,
        stage: ShaderStage,
        reflected: &[ReflectedBinding],
    ) -> Result<(), ConfigError> {
        for binding in reflected {
            match self.bindings.get_mut(&binding.name) {
                Some(existing) => {
                    if !existing.same_slot(binding) {
                        let second = ResourceBinding {
                            name: binding.name.clone(),
                            set: binding.set,
                            binding: binding.binding,
                            descriptor_type: binding.descriptor_type,
                            count: binding.count,
                            stages: stage.flag(),
                        };
                        return Err(ConfigError::BindingMismatch {
                            pipeline: pipeline.to_string(),
                            name: binding.name.clone(),
                            first: existing.describe(),
                            second: second.describe(),
                        });
                    }
                    existing.stages |= stage.flag();
                }
                None => {
                    self.bindings.insert(
                        binding.name.clone(),
                        ResourceBinding {
                            name: binding.name.clone(),
                            set: binding.set,
                            binding: binding.binding,
                            descriptor_type: binding.descriptor_type,
                            count: binding.count,
                            stages: stage.flag(),
                        },
                    );
                }
            }
        }
        Ok(())
    }

    /// Look up a binding by name.
    pub fn get(&self, name: &str) -> Option<&ResourceBinding> {
        self.bindings.get(name)
    }

    /// Number of distinct names.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Check if no stage bound anything.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Group the bindings by set index.
    ///
    /// Returns one entry per set from 0 to the highest used index, each
    /// sorted by binding index. A set index in that range with no bindings
    /// is an error.
    pub fn into_sets(self, pipeline: &str) -> Result<Vec<Vec<ResourceBinding>>, ConfigError> {
        let mut by_set: BTreeMap<u32, Vec<ResourceBinding>> = BTreeMap::new();
        for binding in self.bindings.into_values() {
            by_set.entry(binding.set).or_default().push(binding);
        }

        let mut sets = Vec::with_capacity(by_set.len());
        for (expected, (set, mut bindings)) in (0u32..).zip(by_set) {
            if set != expected {
                return Err(ConfigError::DescriptorSetGap {
                    pipeline: pipeline.to_string(),
                    set: expected,
                });
            }
            bindings.sort_by_key(|b| b.binding);
            sets.push(bindings);
        }
        Ok(sets)
    }
}
