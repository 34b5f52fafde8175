//! rulegen compiler
//!
//! Generates helper adapter classes for rules.
//!
//! ## Pipeline
//!
//! 1. **Name**: [`names::allocate`] picks a fresh class name
//! 2. **Layout**: [`layout`] decides where each binding lives
//! 3. **Build**: [`UnitBuilder`] emits header, fields, constructor, entry
//!    point, accessors and forwarders; an [`ExecutionBackend`] adds the
//!    strategy methods
//! 4. **Check**: optional self-verification with
//!    [`rulegen_classfile::verify_class`]
//! 5. **Dump**: optional best-effort write to a directory
//! 6. **Load**: the rule's [`ModuleSystem`] defines the class
//!
//! ## Modules
//!
//! - [`context`]: operand stack and local slot accounting
//! - [`emit`]: typed method body emitter
//! - [`conversion`]: conversions between `Object` and binding types
//! - [`layout`]: binding storage planning
//! - [`constructor`]: superclass constructor resolution
//! - [`builder`]: class assembly
//! - [`backend`]: compiled and interpreted strategies
//! - [`rule`]: the rule engine's interfaces
//! - [`config`]: compiler options
//! - [`contract`]: runtime class names
//! - [`dump`]: diagnostic class dumps
//! - [`names`]: class name allocation

pub mod backend;
pub mod builder;
pub mod config;
pub mod constructor;
pub mod context;
pub mod contract;
pub mod conversion;
pub mod dump;
pub mod emit;
pub mod layout;
pub mod names;
pub mod rule;

pub use backend::{CompiledBackend, ExecutionBackend, InterpretedBackend};
pub use builder::UnitBuilder;
pub use config::CompilerOptions;
pub use constructor::SuperConstructor;
pub use context::CompileContext;
pub use contract::RuntimeClasses;
pub use conversion::{ConversionStep, plan_conversion};
pub use emit::MethodEmitter;
pub use layout::{BindingLayout, PlannedBinding, Slot};
pub use rule::{AdapterView, ClassHandle, EmptyNode, LoaderRef, ModuleSystem, Rule, RuleNode};

// Re-export the error types from core for convenience
pub use rulegen_core::{CompileCause, CompileError};

use rulegen_core::{HelperClass, Strategy};
use tracing::debug;

/// The bytes of one generated adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedUnit {
    /// Internal name (`org/acme/Helper_HelperAdapter_Compiled_7`).
    pub internal_name: String,
    /// The class file.
    pub bytes: Vec<u8>,
}

impl GeneratedUnit {
    /// The name handed to the class loader.
    pub fn external_name(&self) -> String {
        names::external_name(&self.internal_name)
    }
}

/// A generated adapter defined by the module system.
#[derive(Debug, Clone)]
pub struct LoadedAdapter {
    /// What was generated.
    pub unit: GeneratedUnit,
    /// The defined class.
    pub handle: ClassHandle,
}

/// Generates helper adapters with fixed options.
///
/// Each call is independent; the compiler holds no state besides its options
/// and can be shared between threads.
#[derive(Debug, Clone, Default)]
pub struct AdapterCompiler {
    options: CompilerOptions,
}

impl AdapterCompiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Generate the adapter class for `rule` without loading it.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn compile_bytes(
        &self,
        rule: &dyn Rule,
        helper: &HelperClass,
        strategy: Strategy,
    ) -> Result<GeneratedUnit, CompileError> {
        let internal_name = names::allocate(helper, strategy);
        self.build_named(rule, helper, &internal_name, strategy)
            .map(|bytes| GeneratedUnit {
                internal_name,
                bytes,
            })
            .map_err(|cause| CompileError::new(helper.binary_name(), strategy, cause))
    }

    /// Generate the adapter class for `rule` and define it through the rule's
    /// module system.
    #[cfg_attr(feature = "profiling", profiling::function)]
    pub fn get_helper_adapter(
        &self,
        rule: &dyn Rule,
        helper: &HelperClass,
        strategy: Strategy,
    ) -> Result<LoadedAdapter, CompileError> {
        let unit = self.compile_bytes(rule, helper, strategy)?;
        let external_name = unit.external_name();
        let handle = rule
            .module_system()
            .load_helper_adapter(rule.loader(), &external_name, &unit.bytes)
            .map_err(|err| CompileError::new(helper.binary_name(), strategy, err))?;
        debug!(class = %external_name, loader = %rule.loader(), "loaded helper adapter");
        Ok(LoadedAdapter { unit, handle })
    }

    fn build_named(
        &self,
        rule: &dyn Rule,
        helper: &HelperClass,
        internal_name: &str,
        strategy: Strategy,
    ) -> Result<Vec<u8>, CompileCause> {
        let bytes = UnitBuilder::new(rule, helper, internal_name, strategy, &self.options).build()?;
        if self.options.verify {
            rulegen_classfile::verify_class(&bytes)?;
        }
        if let Some(dir) = &self.options.dump_dir {
            dump::dump_class(dir, internal_name, &bytes);
        }
        Ok(bytes)
    }
}

/// Generate an adapter with default options.
pub fn compile_bytes(
    rule: &dyn Rule,
    helper: &HelperClass,
    strategy: Strategy,
) -> Result<GeneratedUnit, CompileError> {
    AdapterCompiler::default().compile_bytes(rule, helper, strategy)
}

/// Generate and load an adapter with default options.
pub fn get_helper_adapter(
    rule: &dyn Rule,
    helper: &HelperClass,
    strategy: Strategy,
) -> Result<LoadedAdapter, CompileError> {
    AdapterCompiler::default().get_helper_adapter(rule, helper, strategy)
}
