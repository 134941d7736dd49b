use crate::hook::FirehoseHook;
use crate::layer::FirehoseLayer;
use std::sync::Arc;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Options for installing the hook as the global `tracing` subscriber.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   stacked on top of [`FirehoseLayer`] so events are also printed to
///   the console.
#[derive(Clone, Debug)]
pub struct InitConfig {
    pub enable_stdout: bool,
}

impl Default for InitConfig {
    fn default() -> Self {
        Self { enable_stdout: true }
    }
}

/// Install a [`Registry`] combined with a [`FirehoseLayer`] for `hook` as
/// the global default subscriber.
///
/// **Returns**
/// - `Err(..)` if a global subscriber has already been set.
///
/// The hook keeps its own level set; see [`FirehoseHook::set_levels`].
pub fn init_tracing_with_config(
    hook: Arc<FirehoseHook>,
    config: InitConfig,
) -> Result<(), SetGlobalDefaultError> {
    let layer = FirehoseLayer::new(hook);

    // The two subscriber shapes have different types, so each branch
    // installs its own.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        let subscriber = Registry::default().with(layer).with(fmt_layer);
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = Registry::default().with(layer);
        tracing::subscriber::set_global_default(subscriber)
    }
}

/// Initialize tracing with [`InitConfig::default`].
pub fn init_tracing(hook: Arc<FirehoseHook>) -> Result<(), SetGlobalDefaultError> {
    init_tracing_with_config(hook, InitConfig::default())
}
