//! Descriptor set management.
//!
//! Layouts are validated as a whole when they are built, pools track their
//! remaining capacity so exhaustion is reported before the driver is asked,
//! and [`DescriptorWriter`] checks every write against the layout the target
//! set was allocated with.

use crate::device::SharedDevice;
use crate::error::{GpuError, Result};
use crate::memory::BufferRegion;
use ash::vk;
use std::collections::HashMap;

/// One binding slot of a descriptor set layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub kind: vk::DescriptorType,
    pub stages: vk::ShaderStageFlags,
    pub count: u32,
}

impl DescriptorBinding {
    /// A single uniform buffer.
    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            kind: vk::DescriptorType::UNIFORM_BUFFER,
            stages,
            count: 1,
        }
    }

    /// A single storage buffer.
    pub fn storage_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            kind: vk::DescriptorType::STORAGE_BUFFER,
            stages,
            count: 1,
        }
    }

    /// Whether this binding takes buffer descriptors.
    pub fn is_buffer(&self) -> bool {
        matches!(
            self.kind,
            vk::DescriptorType::UNIFORM_BUFFER
                | vk::DescriptorType::STORAGE_BUFFER
                | vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC
                | vk::DescriptorType::STORAGE_BUFFER_DYNAMIC
        )
    }
}

/// Descriptor set layout description.
#[derive(Clone, Debug, Default)]
pub struct DescriptorSetLayoutConfig {
    pub bindings: Vec<DescriptorBinding>,
}

impl DescriptorSetLayoutConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a binding.
    pub fn binding(
        mut self,
        binding: u32,
        kind: vk::DescriptorType,
        count: u32,
        stages: vk::ShaderStageFlags,
    ) -> Self {
        self.bindings.push(DescriptorBinding {
            binding,
            kind,
            stages,
            count,
        });
        self
    }

    /// Add a uniform buffer binding.
    pub fn uniform_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings
            .push(DescriptorBinding::uniform_buffer(binding, stages));
        self
    }

    /// Add a storage buffer binding.
    pub fn storage_buffer(mut self, binding: u32, stages: vk::ShaderStageFlags) -> Self {
        self.bindings
            .push(DescriptorBinding::storage_buffer(binding, stages));
        self
    }

    /// Validate the binding set and return it sorted by binding index.
    pub fn validated(&self) -> Result<Vec<DescriptorBinding>> {
        let mut bindings = self.bindings.clone();
        bindings.sort_by_key(|b| b.binding);

        for pair in bindings.windows(2) {
            if pair[0].binding == pair[1].binding {
                return Err(GpuError::DuplicateBinding(pair[0].binding));
            }
        }
        if let Some(b) = bindings.iter().find(|b| b.count == 0) {
            return Err(GpuError::InvalidConfig(format!(
                "Binding {} declares zero descriptors",
                b.binding
            )));
        }

        Ok(bindings)
    }
}

/// A validated descriptor set layout.
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    bindings: Vec<DescriptorBinding>,
    device: SharedDevice,
}

impl DescriptorSetLayout {
    /// Validate `config` and create the layout.
    pub fn new(device: SharedDevice, config: &DescriptorSetLayoutConfig) -> Result<Self> {
        let bindings = config.validated()?;
        let layout = device.create_descriptor_set_layout(&bindings)?;
        Ok(Self {
            layout,
            bindings,
            device,
        })
    }

    /// Get the raw layout handle.
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// Bindings sorted by index.
    pub fn bindings(&self) -> &[DescriptorBinding] {
        &self.bindings
    }

    /// Look up a binding by index.
    pub fn binding(&self, binding: u32) -> Option<&DescriptorBinding> {
        self.bindings.iter().find(|b| b.binding == binding)
    }

    /// Whether sets of this layout can be bound where `other` is declared.
    pub fn is_compatible(&self, other: &DescriptorSetLayout) -> bool {
        self.bindings == other.bindings
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        self.device.destroy_descriptor_set_layout(self.layout);
    }
}

/// Descriptor pool sizing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DescriptorPoolConfig {
    pub max_sets: u32,
    pub sizes: Vec<(vk::DescriptorType, u32)>,
}

impl DescriptorPoolConfig {
    /// Size a pool for `sets` copies of `layout`.
    pub fn for_layout(layout: &DescriptorSetLayout, sets: u32) -> Self {
        let mut sizes: Vec<(vk::DescriptorType, u32)> = Vec::new();
        for b in layout.bindings() {
            let needed = b.count.saturating_mul(sets);
            match sizes.iter_mut().find(|(kind, _)| *kind == b.kind) {
                Some((_, count)) => *count = count.saturating_add(needed),
                None => sizes.push((b.kind, needed)),
            }
        }
        Self {
            max_sets: sets,
            sizes,
        }
    }
}

/// Descriptor pool that tracks its remaining capacity.
///
/// Sets are freed together with the pool.
pub struct DescriptorPool {
    pool: vk::DescriptorPool,
    remaining_sets: u32,
    remaining: Vec<(vk::DescriptorType, u32)>,
    /// Binding list each live set was allocated with.
    set_bindings: HashMap<vk::DescriptorSet, Vec<DescriptorBinding>>,
    device: SharedDevice,
}

impl DescriptorPool {
    /// Create a new descriptor pool.
    pub fn new(device: SharedDevice, config: &DescriptorPoolConfig) -> Result<Self> {
        let sizes: Vec<vk::DescriptorPoolSize> = config
            .sizes
            .iter()
            .map(|&(ty, descriptor_count)| vk::DescriptorPoolSize {
                ty,
                descriptor_count,
            })
            .collect();
        let pool = device.create_descriptor_pool(config.max_sets, &sizes)?;

        Ok(Self {
            pool,
            remaining_sets: config.max_sets,
            remaining: config.sizes.clone(),
            set_bindings: HashMap::new(),
            device,
        })
    }

    /// Get the raw pool handle.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.pool
    }

    /// Number of sets that can still be allocated.
    pub fn remaining_sets(&self) -> u32 {
        self.remaining_sets
    }

    /// Bindings of the layout `set` was allocated with, if it came from this
    /// pool.
    pub fn bindings_of(&self, set: vk::DescriptorSet) -> Option<&[DescriptorBinding]> {
        self.set_bindings.get(&set).map(Vec::as_slice)
    }

    /// Allocate one set of `layout`.
    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        if self.remaining_sets == 0 {
            return Err(GpuError::DescriptorPoolExhausted(
                "No descriptor sets left in pool".to_string(),
            ));
        }
        for b in layout.bindings() {
            let available = self
                .remaining
                .iter()
                .find(|(kind, _)| *kind == b.kind)
                .map_or(0, |(_, count)| *count);
            if available < b.count {
                return Err(GpuError::DescriptorPoolExhausted(format!(
                    "Pool has {available} {:?} descriptors left, binding {} needs {}",
                    b.kind, b.binding, b.count
                )));
            }
        }

        let set = self.device.allocate_descriptor_set(self.pool, layout.handle())?;

        self.remaining_sets -= 1;
        for b in layout.bindings() {
            if let Some((_, count)) = self.remaining.iter_mut().find(|(kind, _)| *kind == b.kind)
            {
                *count -= b.count;
            }
        }
        self.set_bindings.insert(set, layout.bindings().to_vec());
        Ok(set)
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        self.device.destroy_descriptor_pool(self.pool);
    }
}

/// Collects buffer writes for sets of one layout.
pub struct DescriptorWriter<'a> {
    layout: &'a DescriptorSetLayout,
    writes: Vec<(u32, BufferRegion)>,
}

impl<'a> DescriptorWriter<'a> {
    /// Start a writer for sets of `layout`.
    pub fn new(layout: &'a DescriptorSetLayout) -> Self {
        Self {
            layout,
            writes: Vec::new(),
        }
    }

    /// Bind `region` at `binding`.
    pub fn buffer(mut self, binding: u32, region: BufferRegion) -> Self {
        self.writes.push((binding, region));
        self
    }

    /// Allocate a set from `pool` and apply the writes to it.
    pub fn build(&self, pool: &mut DescriptorPool) -> Result<vk::DescriptorSet> {
        self.check_writes()?;
        let set = pool.allocate(self.layout)?;
        self.apply(pool, set);
        Ok(set)
    }

    /// Apply the writes to an existing set allocated from `pool`.
    ///
    /// The set's layout must be compatible with the writer's, not
    /// necessarily the same object.
    pub fn overwrite(&self, pool: &DescriptorPool, set: vk::DescriptorSet) -> Result<()> {
        match pool.bindings_of(set) {
            Some(bindings) if bindings == self.layout.bindings() => {}
            Some(_) => {
                return Err(GpuError::LayoutMismatch(
                    "Set was allocated with a different layout".to_string(),
                ))
            }
            None => {
                return Err(GpuError::LayoutMismatch(
                    "Set was not allocated from this pool".to_string(),
                ))
            }
        }
        self.check_writes()?;
        self.apply(pool, set);
        Ok(())
    }

    fn check_writes(&self) -> Result<()> {
        for &(binding, _) in &self.writes {
            let Some(b) = self.layout.binding(binding) else {
                return Err(GpuError::LayoutMismatch(format!(
                    "Layout has no binding {binding}"
                )));
            };
            if !b.is_buffer() {
                return Err(GpuError::LayoutMismatch(format!(
                    "Binding {binding} is {:?}, not a buffer",
                    b.kind
                )));
            }
        }
        Ok(())
    }

    fn apply(&self, pool: &DescriptorPool, set: vk::DescriptorSet) {
        for &(binding, region) in &self.writes {
            if let Some(b) = self.layout.binding(binding) {
                pool.device
                    .write_buffer_descriptor(set, binding, b.kind, region);
            }
        }
    }
}
