use tracing::{debug, info, warn};
use viewlink_core::{Mode, PresenterError, SupportedMode, TransportError};
use viewlink_transport::SessionTransport;

/// Built-in modes the transport was able to resolve.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModeCatalog {
    modes: Vec<Mode>,
}

impl ModeCatalog {
    /// Resolve every built-in mode. Modes the transport cannot carry are
    /// dropped; other failures abort startup.
    pub fn resolve(transport: &mut dyn SessionTransport) -> Result<Self, PresenterError> {
        let mut modes = Vec::with_capacity(Mode::ALL.len());
        for mode in Mode::ALL {
            match transport.resolve_mode(mode) {
                Ok(()) => {
                    debug!("Catalog: resolved {} mode {:?}", mode, mode.descriptor());
                    modes.push(mode);
                }
                Err(TransportError::UnsupportedMode { .. }) => {
                    warn!("Catalog: {} mode is not supported by the transport; skipping", mode);
                }
                Err(e) => return Err(e.into()),
            }
        }
        if modes.is_empty() {
            return Err(PresenterError::NoSupportedModes);
        }
        info!("Catalog: {} mode(s) available: {:?}", modes.len(), modes);
        Ok(Self { modes })
    }

    pub fn modes(&self) -> &[Mode] {
        &self.modes
    }

    pub fn contains(&self, mode: Mode) -> bool {
        self.modes.contains(&mode)
    }

    /// Registration list: every resolved mode, available.
    pub fn supported_modes(&self) -> Vec<SupportedMode> {
        self.modes.iter().copied().map(SupportedMode::available).collect()
    }
}
