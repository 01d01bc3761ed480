//! Mutable agent state threaded through every subsystem call.
//!
//! `AgentContext` is the one place the control loop keeps state between
//! iterations: the running configuration, what is installed, when OTA and
//! heartbeat last ran, the link bookkeeping, and an ack still owed to the
//! backend. Nothing lives in globals; subsystems receive `&mut AgentContext`.

use crate::config::AgentConfig;
use crate::protocol::ArtifactKind;

// ---------------------------------------------------------------------------
// Installed artifacts
// ---------------------------------------------------------------------------

/// Where an artifact's OTA pipeline currently stands.
///
/// ```text
/// UnknownInstalled ─fetch─▶ CandidateAvailable ─verify─▶ Verified ─apply─▶ Installed
///                                  │
///                                  └─mismatch─▶ Rejected
/// ```
///
/// `Installed` and `Rejected` fall back to `UnknownInstalled` at the start
/// of the next check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArtifactState {
    #[default]
    UnknownInstalled,
    CandidateAvailable,
    Verified,
    Installed,
    Rejected,
}

/// Installed version and checksum of one artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactTrack {
    pub version: String,
    /// Digest of the installed content; empty if never recorded.
    pub checksum: String,
    pub state: ArtifactState,
}

impl ArtifactTrack {
    pub fn new(version: &str, checksum: &str) -> Self {
        Self {
            version: version.to_string(),
            checksum: checksum.to_string(),
            state: ArtifactState::UnknownInstalled,
        }
    }
}

// ---------------------------------------------------------------------------
// Link and loop bookkeeping
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkState {
    /// SSID of the network the last convergence pass settled on.
    pub ssid: Option<String>,
    /// Link confirmed up at the last check.
    pub up: bool,
    /// The link has been up at least once since boot.
    pub had_link: bool,
    /// Recoveries after an outage.
    pub reconnects: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub commands_executed: u32,
}

// ---------------------------------------------------------------------------
// AgentContext
// ---------------------------------------------------------------------------

pub struct AgentContext {
    /// Configuration in effect: the boot config with remote settings merged.
    pub config: AgentConfig,
    /// Configuration as compiled/provisioned, before remote settings.
    pub base_config: AgentConfig,

    /// Clock reading when the context was created.
    pub boot_ms: u64,

    pub firmware: ArtifactTrack,
    pub config_artifact: ArtifactTrack,

    /// `None` until the first OTA check, which makes that check immediate.
    pub last_ota_check_ms: Option<u64>,
    pub last_heartbeat_ms: u64,

    pub link: LinkState,

    /// Command whose relay pulse ran but whose acknowledgement failed in
    /// transit. A re-offer of this id is acknowledged without pulsing again.
    pub pending_ack: Option<u64>,

    pub stats: LoopStats,
}

impl AgentContext {
    pub fn new(config: AgentConfig, boot_ms: u64) -> Self {
        Self {
            base_config: config.clone(),
            config,
            boot_ms,
            firmware: ArtifactTrack::new(crate::config::FIRMWARE_VERSION, ""),
            config_artifact: ArtifactTrack::new(crate::config::FACTORY_CONFIG_VERSION, ""),
            last_ota_check_ms: None,
            last_heartbeat_ms: boot_ms,
            link: LinkState::default(),
            pending_ack: None,
            stats: LoopStats::default(),
        }
    }

    pub fn track(&self, kind: ArtifactKind) -> &ArtifactTrack {
        match kind {
            ArtifactKind::Firmware => &self.firmware,
            ArtifactKind::Config => &self.config_artifact,
        }
    }

    pub fn track_mut(&mut self, kind: ArtifactKind) -> &mut ArtifactTrack {
        match kind {
            ArtifactKind::Firmware => &mut self.firmware,
            ArtifactKind::Config => &mut self.config_artifact,
        }
    }

    pub fn uptime_ms(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.boot_ms)
    }

    /// Whether an OTA check should run at `now_ms`.
    pub fn ota_due(&self, now_ms: u64) -> bool {
        if !self.config.ota_enabled {
            return false;
        }
        match self.last_ota_check_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) >= u64::from(self.config.ota_check_interval_ms),
        }
    }

    pub fn heartbeat_due(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_heartbeat_ms) >= u64::from(self.config.heartbeat_interval_ms)
    }
}
