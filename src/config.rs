use alloc::vec;
use embassy_sync::once_lock::OnceLock;

pub use modem_config::*;

static CONFIG: OnceLock<SequenceConfig> = OnceLock::new();

/// Sequence configuration generated from `config.yml` by the build script
pub fn sequence() -> &'static SequenceConfig {
    CONFIG.get_or_init(|| include!(concat!(env!("OUT_DIR"), "/sequence_config.rs")))
}
