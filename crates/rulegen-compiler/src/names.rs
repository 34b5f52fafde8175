//! Adapter class name allocation.

use std::sync::atomic::{AtomicU64, Ordering};

use rulegen_core::{HelperClass, Strategy};

/// Process-wide sequence number for generated classes. Never reset.
static NEXT_ADAPTER_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate a fresh internal name for an adapter of `helper`.
///
/// The result is `<helper>_HelperAdapter_<Compiled|Interpreted>_<n>`, where
/// `n` is unique within the process. Two concurrent requests for the same
/// rule receive distinct names.
pub fn allocate(helper: &HelperClass, strategy: Strategy) -> String {
    let n = NEXT_ADAPTER_ID.fetch_add(1, Ordering::Relaxed);
    format!(
        "{}_HelperAdapter_{}_{}",
        helper.internal_name(),
        strategy.tag(),
        n
    )
}

/// The name handed to the class loader: `/` separators become `.`.
pub fn external_name(internal_name: &str) -> String {
    internal_name.replace('/', ".")
}
