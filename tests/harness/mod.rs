//! Shared fixtures for adapter tests.

#![allow(dead_code)]

pub mod jvm;
pub mod rules;

pub use jvm::{Evaluator, Jvm, Object, Ref, Trap, Value};
pub use rules::{RecordingModules, Script, Step, TestRule};

use rulegen::prelude::*;

/// Internal name of the default test helper.
pub const HELPER: &str = "org/acme/Helper";

/// A helper with a public `(Rule)` constructor.
pub fn helper() -> HelperClass {
    HelperClass::new(HELPER).with_constructor(
        vec![JvmType::class("org/jboss/byteman/rule/Rule")],
        MemberAccess::Public,
    )
}

/// Options with verification on and tracing off.
pub fn quiet_options() -> CompilerOptions {
    CompilerOptions::default()
        .with_verify(true)
        .with_trace(false)
}

/// Generate an adapter for `rule` or panic.
pub fn compile(rule: &TestRule, strategy: Strategy, options: CompilerOptions) -> GeneratedUnit {
    AdapterCompiler::new(options)
        .compile_bytes(rule, &helper(), strategy)
        .unwrap_or_else(|err| panic!("generation failed: {}", err))
}

/// A running adapter instance.
pub struct Instance {
    pub jvm: Jvm,
    pub adapter: Ref,
    pub rule: Ref,
}

/// Generate, define and instantiate an adapter for `rule`.
pub fn instantiate(rule: &TestRule, strategy: Strategy, options: CompilerOptions) -> Instance {
    let unit = compile(rule, strategy, options);
    let mut jvm = Jvm::new();
    let class = jvm.define(&unit.bytes).expect("class parses");
    let rule_ref = jvm.new_rule(&rule.name, rule.logic());
    let adapter = jvm
        .instantiate(&class, rule_ref)
        .unwrap_or_else(|trap| panic!("constructor failed: {}", trap));
    Instance {
        jvm,
        adapter,
        rule: rule_ref,
    }
}

/// Install a fmt subscriber once; `RUST_LOG` picks the level.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
