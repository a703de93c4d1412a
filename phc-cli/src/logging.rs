//! Tracing setup for the `phc` binary.
//!
//! The subscriber is installed before configuration is read so that loading
//! the configuration is itself logged. When neither `--debug` nor `RUST_LOG`
//! chose a filter, the configured `log.filter` is swapped in afterwards.

use tracing::Subscriber;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, reload, EnvFilter, Registry};

/// Filter used with `--debug`
pub const DEBUG_FILTER: &str = "phc=debug,phc_entity=debug,phc_fields=debug,phc_config=debug";

/// Replaces the active filter once configuration is known.
pub type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// A filter chosen on the command line or through `RUST_LOG`.
pub fn explicit_filter(debug: bool) -> Option<EnvFilter> {
    if debug {
        Some(EnvFilter::new(DEBUG_FILTER))
    } else {
        EnvFilter::try_from_default_env().ok()
    }
}

/// A formatting subscriber writing to `writer` with a reloadable filter.
pub fn subscriber<W>(initial: EnvFilter, writer: W) -> (impl Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(initial);
    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_target(false)
            .with_ansi(false)
            .with_writer(writer),
    );
    (subscriber, handle)
}

/// Switch to the configured filter.
pub fn apply_configured(handle: &FilterHandle, directive: &str) {
    if let Err(e) = handle.reload(EnvFilter::new(directive)) {
        tracing::warn!(error = %e, "could not apply configured log filter");
    }
}
