//! The live crate model shared between the readout loop and the control server.
//!
//! Ownership of mutation stays with the acquisition side. What the control server
//! may see concurrently is synchronized explicitly:
//!
//! - counters updated on the hot path are atomics; each value is read on its own,
//!   so a snapshot is not consistent across counters
//! - configuration trees sit behind a `RwLock`
//! - module drivers and the GOC sit behind a `Mutex`, so hardware access from the
//!   control server never interleaves with the readout of the same module
use std::sync::{
    Mutex, MutexGuard, RwLock,
    atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering},
};

use daqctl_protocol::{
    AccessEntry, ConfigNode, CrateInfo, CrateTopology, GocAddress, Keyword, ModuleInfo,
    ModuleTopology, RegisterArray, RegisterValue, ScalarValue, TagInfo, Target,
};

use crate::{GocAccess, HandlerError, ModuleDriver};

/// All crates of the acquisition process.
pub struct CrateArray {
    crates: Vec<Crate>,
}

impl CrateArray {
    pub fn new(crates: Vec<Crate>) -> CrateArray {
        CrateArray { crates }
    }

    pub fn crates(&self) -> &[Crate] {
        &self.crates
    }

    pub fn get(&self, crate_i: u16) -> Result<&Crate, HandlerError> {
        self.crates
            .get(usize::from(crate_i))
            .ok_or(HandlerError::NoSuchCrate(crate_i))
    }

    pub fn topology(&self) -> Vec<CrateTopology> {
        self.crates.iter().map(Crate::topology).collect()
    }

    /// Finds the module or submodule a target points at.
    pub fn module(&self, target: &Target) -> Result<&Module, HandlerError> {
        let crate_i = target.crate_i.ok_or(HandlerError::MissingTarget("crate"))?;
        let module_j = target.module_j.ok_or(HandlerError::MissingTarget("module"))?;
        let crate_ = self.get(crate_i)?;
        let index = match target.tag_i {
            Some(tag_i) => {
                let tag = crate_
                    .tags
                    .get(usize::from(tag_i))
                    .ok_or(HandlerError::NoSuchTag { crate_i, tag_i })?;
                *tag.modules
                    .get(usize::from(module_j))
                    .ok_or(HandlerError::NoSuchModule(*target))?
            }
            None => module_j,
        };
        let module = crate_
            .modules
            .get(usize::from(index))
            .ok_or(HandlerError::NoSuchModule(*target))?;
        match target.submodule_k {
            Some(submodule_k) => module
                .submodules
                .get(usize::from(submodule_k))
                .ok_or(HandlerError::NoSuchSubmodule(*target)),
            None => Ok(module),
        }
    }

    /// Full configuration trees below a target, with `touched` bubbled up.
    pub fn config_trees(&self, target: &Target) -> Result<Vec<ConfigNode>, HandlerError> {
        match (target.crate_i, target.module_j) {
            (None, _) => self.crates.iter().map(Crate::config_tree).collect(),
            (Some(_), Some(_)) => Ok(vec![self.module(target)?.config_tree()?]),
            (Some(_), None) if target.tag_i.is_some() || target.submodule_k.is_some() => {
                Err(HandlerError::MissingTarget("module"))
            }
            (Some(crate_i), None) => Ok(vec![self.get(crate_i)?.config_tree()?]),
        }
    }

    /// Configuration trees below a target, reduced to what differs from defaults.
    pub fn config_dump(&self, target: &Target) -> Result<Vec<ConfigNode>, HandlerError> {
        Ok(self
            .config_trees(target)?
            .into_iter()
            .filter_map(ConfigNode::prune_untouched)
            .collect())
    }
}

/// Counters the readout loop maintains for one crate.
#[derive(Debug, Default)]
pub struct CrateCounters {
    running: AtomicBool,
    events: AtomicU64,
    deadtime_release_us: AtomicU32,
}

impl CrateCounters {
    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn add_events(&self, count: u64) {
        self.events.fetch_add(count, Ordering::Relaxed);
    }

    pub fn events(&self) -> u64 {
        self.events.load(Ordering::Relaxed)
    }

    pub fn set_deadtime_release_us(&self, us: u32) {
        self.deadtime_release_us.store(us, Ordering::Relaxed);
    }

    pub fn deadtime_release_us(&self) -> u32 {
        self.deadtime_release_us.load(Ordering::Relaxed)
    }
}

/// A trigger tag: a subset of the crate's modules read out together.
#[derive(Debug)]
pub struct Tag {
    name: String,
    modules: Vec<u16>,
    events: AtomicU32,
}

impl Tag {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[u16] {
        &self.modules
    }

    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn events(&self) -> u32 {
        self.events.load(Ordering::Relaxed)
    }

    fn info(&self) -> TagInfo {
        TagInfo {
            name: self.name.clone(),
            event_count: self.events(),
            modules: self.modules.clone(),
        }
    }
}

/// One crate: a group of modules read out together.
pub struct Crate {
    name: String,
    config: RwLock<ConfigNode>,
    modules: Vec<Module>,
    tags: Vec<Tag>,
    goc: Option<Mutex<Box<dyn GocAccess>>>,
    counters: CrateCounters,
}

impl Crate {
    /// Creates a crate whose configuration is an untouched `CRATE("name")` block.
    pub fn new(name: impl Into<String>) -> Crate {
        let name = name.into();
        let config =
            ConfigNode::block(Keyword::CRATE).with_scalar(ScalarValue::String(name.clone()));
        Crate {
            name,
            config: RwLock::new(config),
            modules: Vec::new(),
            tags: Vec::new(),
            goc: None,
            counters: CrateCounters::default(),
        }
    }

    /// Replaces the crate's own configuration block. Module blocks are not part
    /// of it; they are attached from the modules when a tree is requested.
    pub fn with_config(self, config: ConfigNode) -> Crate {
        Crate {
            config: RwLock::new(config),
            ..self
        }
    }

    pub fn with_module(mut self, module: Module) -> Crate {
        self.modules.push(module);
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, modules: Vec<u16>) -> Crate {
        self.tags.push(Tag {
            name: name.into(),
            modules,
            events: AtomicU32::new(0),
        });
        self
    }

    pub fn with_goc(mut self, goc: impl GocAccess + 'static) -> Crate {
        self.goc = Some(Mutex::new(Box::new(goc)));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn counters(&self) -> &CrateCounters {
        &self.counters
    }

    /// Swaps in a new configuration block, e.g. after a reconfiguration.
    pub fn set_config(&self, config: ConfigNode) -> Result<(), HandlerError> {
        *self.config.write().map_err(|_| HandlerError::Poisoned)? = config;
        Ok(())
    }

    pub fn topology(&self) -> CrateTopology {
        CrateTopology {
            name: self.name.clone(),
            modules: self.modules.iter().map(Module::topology).collect(),
        }
    }

    pub fn info(&self) -> CrateInfo {
        CrateInfo {
            name: self.name.clone(),
            running: self.counters.is_running(),
            event_count: self.counters.events(),
            deadtime_release_us: self.counters.deadtime_release_us(),
            tags: self.tags.iter().map(Tag::info).collect(),
            modules: self.modules.iter().map(Module::info).collect(),
        }
    }

    /// The crate block with the blocks of all modules attached.
    pub fn config_tree(&self) -> Result<ConfigNode, HandlerError> {
        let mut tree = self
            .config
            .read()
            .map_err(|_| HandlerError::Poisoned)?
            .clone();
        for module in &self.modules {
            tree.children.push(module.config_tree()?);
        }
        tree.bubble_touched();
        Ok(tree)
    }

    fn goc(&self, crate_i: u16) -> Result<MutexGuard<'_, Box<dyn GocAccess>>, HandlerError> {
        self.goc
            .as_ref()
            .ok_or(HandlerError::NoGoc(crate_i))?
            .lock()
            .map_err(|_| HandlerError::Poisoned)
    }

    /// Reads `count` consecutive words starting at `address`.
    pub fn goc_read(&self, address: &GocAddress, count: u16) -> Result<Vec<u32>, HandlerError> {
        let mut goc = self.goc(address.crate_i)?;
        (0..u32::from(count))
            .map(|i| {
                let offset = address.offset.wrapping_add(4 * i);
                Ok(goc.read(address.sfp, address.card, offset)?)
            })
            .collect()
    }

    /// Writes consecutive words starting at `address`. Returns the number written.
    pub fn goc_write(&self, address: &GocAddress, values: &[u32]) -> Result<u32, HandlerError> {
        let mut goc = self.goc(address.crate_i)?;
        for (i, value) in (0u32..).zip(values) {
            let offset = address.offset.wrapping_add(4 * i);
            goc.write(address.sfp, address.card, offset, *value)?;
        }
        Ok(values.len() as u32)
    }
}

/// One hardware module, or a submodule behind one.
pub struct Module {
    module_type: Keyword,
    config: RwLock<ConfigNode>,
    event_counter: AtomicU32,
    counter_mask: u32,
    driver: Mutex<Box<dyn ModuleDriver>>,
    submodules: Vec<Module>,
}

impl Module {
    /// Creates a module whose configuration is an untouched block named after its type.
    pub fn new(module_type: Keyword, driver: impl ModuleDriver + 'static) -> Module {
        Module {
            module_type,
            config: RwLock::new(ConfigNode::block(module_type)),
            event_counter: AtomicU32::new(0),
            counter_mask: u32::MAX,
            driver: Mutex::new(Box::new(driver)),
            submodules: Vec::new(),
        }
    }

    pub fn with_config(self, config: ConfigNode) -> Module {
        Module {
            config: RwLock::new(config),
            ..self
        }
    }

    /// Bits of the hardware event counter that are significant.
    pub fn with_counter_mask(self, counter_mask: u32) -> Module {
        Module {
            counter_mask,
            ..self
        }
    }

    pub fn with_submodule(mut self, submodule: Module) -> Module {
        self.submodules.push(submodule);
        self
    }

    pub fn module_type(&self) -> Keyword {
        self.module_type
    }

    pub fn submodules(&self) -> &[Module] {
        &self.submodules
    }

    pub fn set_event_counter(&self, value: u32) {
        self.event_counter
            .store(value & self.counter_mask, Ordering::Relaxed);
    }

    pub fn event_counter(&self) -> u32 {
        self.event_counter.load(Ordering::Relaxed)
    }

    /// Exclusive access to the driver, shared with the readout loop.
    pub fn lock_driver(&self) -> Result<MutexGuard<'_, Box<dyn ModuleDriver>>, HandlerError> {
        self.driver.lock().map_err(|_| HandlerError::Poisoned)
    }

    fn topology(&self) -> ModuleTopology {
        ModuleTopology {
            module_type: self.module_type,
            submodules: self.submodules.iter().map(|s| s.module_type).collect(),
        }
    }

    fn info(&self) -> ModuleInfo {
        ModuleInfo {
            module_type: self.module_type,
            event_counter: self.event_counter(),
            counter_mask: self.counter_mask,
            submodules: self.submodules.iter().map(|s| s.module_type).collect(),
        }
    }

    /// The module block with the blocks of all submodules attached.
    pub fn config_tree(&self) -> Result<ConfigNode, HandlerError> {
        let mut tree = self
            .config
            .read()
            .map_err(|_| HandlerError::Poisoned)?
            .clone();
        for submodule in &self.submodules {
            tree.children.push(submodule.config_tree()?);
        }
        tree.bubble_touched();
        Ok(tree)
    }

    /// Reads every readable register of the static table plus the custom ones.
    /// Write-only registers are reported as 0.
    pub fn register_array(&self) -> Result<RegisterArray, HandlerError> {
        let mut driver = self.lock_driver()?;
        let table = driver.registers().to_vec();
        let mut registers = Vec::with_capacity(table.len());
        for descriptor in table {
            let value = if descriptor.access.is_readable() {
                driver.read(descriptor.offset, descriptor.width)?
            } else {
                0
            };
            registers.push(RegisterValue { descriptor, value });
        }
        let custom = driver.custom_registers()?;
        Ok(RegisterArray {
            module_type: self.module_type,
            registers,
            custom,
        })
    }

    /// Executes raw accesses in order, storing read results into the entries.
    ///
    /// Stops at the first failing entry; writes before it have taken effect.
    pub fn execute(&self, entries: &mut [AccessEntry]) -> Result<(), HandlerError> {
        let mut driver = self.lock_driver()?;
        for entry in entries.iter_mut() {
            let width = entry.width().ok_or(HandlerError::InvalidWidth(entry.bits))?;
            if entry.is_read {
                entry.value = driver.read(entry.offset, width)?;
            } else {
                driver.write(entry.offset, width, entry.value & width.mask())?;
            }
        }
        Ok(())
    }
}
