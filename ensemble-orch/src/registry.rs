//! The CI directory: names, roles, ports, status, counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ensemble_types::{CiMessage, CiStatus, RegistryError, Role};

use crate::bus::BusTransport;

/// Default base port for role slot ranges.
pub const DEFAULT_BASE_PORT: u16 = 9000;

/// Ports available to each role.
pub const PORTS_PER_ROLE: u16 = 10;

/// Default entry capacity.
pub const DEFAULT_CAPACITY: usize = 64;

/// Longest CI name the registry accepts.
pub const MAX_NAME_LEN: usize = 31;

/// Heartbeats older than this count as stale in [`Registry::check_health`].
pub const STALE_HEARTBEAT: Duration = Duration::from_secs(60);

/// Per-CI delivery counters.
#[derive(Debug, Clone, Default)]
pub struct Counters {
    /// Messages this CI has sent.
    pub messages_sent: u64,
    /// Messages delivered to this CI.
    pub messages_received: u64,
    /// Delivery and lifecycle errors charged to this CI.
    pub errors: u64,
    /// When the last error was recorded.
    pub last_error_at: Option<DateTime<Utc>>,
}

/// One registered CI.
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    /// Unique name, at most [`MAX_NAME_LEN`] chars.
    pub name: String,
    /// The CI's role.
    pub role: Role,
    /// Model id backing this CI.
    pub model: String,
    /// Host the CI listens on.
    pub host: String,
    /// Port assigned from the role's slot range. Unique per registry.
    pub port: u16,
    /// Whether a bus connection is currently established.
    pub connected: bool,
    /// Current status, mirrored from the lifecycle supervisor.
    pub status: CiStatus,
    /// When the entry was added.
    pub registered_at: DateTime<Utc>,
    /// When the CI last heartbeated.
    pub last_heartbeat: DateTime<Utc>,
    /// Delivery counters.
    pub counters: Counters,
}

/// The name→entry directory for one session.
///
/// Entries are owned by the registry; everything else refers to them by
/// name and looks them up on every access.
pub struct Registry {
    entries: Vec<RegistryEntry>,
    capacity: usize,
    base_port: u16,
    transport: Arc<dyn BusTransport>,
}

impl Registry {
    /// Create a registry with the default capacity and base port.
    #[must_use]
    pub fn new(transport: Arc<dyn BusTransport>) -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_BASE_PORT, transport)
    }

    /// Create a registry with an explicit capacity and base port.
    #[must_use]
    pub fn with_capacity(
        capacity: usize,
        base_port: u16,
        transport: Arc<dyn BusTransport>,
    ) -> Self {
        Self {
            entries: Vec::new(),
            capacity,
            base_port,
            transport,
        }
    }

    /// The base port role slot ranges are computed from.
    #[must_use]
    pub fn base_port(&self) -> u16 {
        self.base_port
    }

    /// Number of registered entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over all entries in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.iter()
    }

    /// Register a CI. The port must come from [`Registry::allocate_port`]
    /// or be otherwise unique.
    pub fn add_ci(
        &mut self,
        name: &str,
        role: Role,
        model: &str,
        port: u16,
    ) -> Result<(), RegistryError> {
        if name.is_empty() || name.len() > MAX_NAME_LEN {
            return Err(RegistryError::NameTooLong(name.to_string()));
        }
        if self.entries.len() >= self.capacity {
            return Err(RegistryError::QueueFull("registry"));
        }
        if self.find_by_name(name).is_some() {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        if !self.is_port_available(port) {
            return Err(RegistryError::PortInUse(port));
        }
        let now = Utc::now();
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            role,
            model: model.to_string(),
            host: "127.0.0.1".to_string(),
            port,
            connected: false,
            status: CiStatus::Offline,
            registered_at: now,
            last_heartbeat: now,
            counters: Counters::default(),
        });
        tracing::info!(name, role = %role, port, "ci registered");
        Ok(())
    }

    /// Remove a CI by name.
    pub fn remove_ci(&mut self, name: &str) -> Result<(), RegistryError> {
        let index = self
            .index_of(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.entries.remove(index);
        tracing::info!(name, "ci removed");
        Ok(())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }

    /// Look up an entry by name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    pub(crate) fn find_by_name_mut(&mut self, name: &str) -> Option<&mut RegistryEntry> {
        self.entries.iter_mut().find(|e| e.name == name)
    }

    /// First entry with the given role, in registration order.
    #[must_use]
    pub fn find_by_role(&self, role: Role) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.role == role)
    }

    /// Every entry with the given role, in registration order.
    #[must_use]
    pub fn all_by_role(&self, role: Role) -> Vec<&RegistryEntry> {
        self.entries.iter().filter(|e| e.role == role).collect()
    }

    /// First entry that is ready for work.
    #[must_use]
    pub fn find_available(&self) -> Option<&RegistryEntry> {
        self.entries.iter().find(|e| e.status == CiStatus::Ready)
    }

    /// Set an entry's status (mirror of the lifecycle supervisor).
    pub fn update_status(&mut self, name: &str, status: CiStatus) -> Result<(), RegistryError> {
        let entry = self
            .find_by_name_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.status = status;
        Ok(())
    }

    /// Record whether a bus connection is established for `name`.
    pub fn mark_connected(&mut self, name: &str, connected: bool) -> Result<(), RegistryError> {
        let entry = self
            .find_by_name_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.connected = connected;
        Ok(())
    }

    /// Record a heartbeat observed at `now`.
    pub fn record_heartbeat(
        &mut self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), RegistryError> {
        let entry = self
            .find_by_name_mut(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        entry.last_heartbeat = now;
        Ok(())
    }

    /// Count entries whose last heartbeat is older than
    /// [`STALE_HEARTBEAT`] at `now`.
    #[must_use]
    pub fn check_health(&self, now: DateTime<Utc>) -> usize {
        let stale =
            chrono::Duration::from_std(STALE_HEARTBEAT).unwrap_or_else(|_| chrono::Duration::seconds(60));
        self.entries
            .iter()
            .filter(|e| now - e.last_heartbeat > stale)
            .count()
    }

    /// Whether no entry holds `port`.
    #[must_use]
    pub fn is_port_available(&self, port: u16) -> bool {
        !self.entries.iter().any(|e| e.port == port)
    }

    /// First free port in `role`'s slot range.
    ///
    /// Each role owns [`PORTS_PER_ROLE`] consecutive ports starting at
    /// `base_port + role.port_offset()`. A full range fails with
    /// queue-full.
    pub fn allocate_port(&self, role: Role) -> Result<u16, RegistryError> {
        let start = self.base_port + role.port_offset();
        (start..start + PORTS_PER_ROLE)
            .find(|port| self.is_port_available(*port))
            .ok_or(RegistryError::QueueFull("role port range"))
    }

    /// Deliver `message` from `message.from` to `message.to`.
    ///
    /// The recipient must be ready or busy. Sender and recipient counters
    /// are updated before the hand-off; a transport failure additionally
    /// charges the recipient's error counter and is propagated.
    pub fn send_message(&mut self, message: &CiMessage) -> Result<(), RegistryError> {
        if self.find_by_name(&message.from).is_none() {
            return Err(RegistryError::NotFound(message.from.clone()));
        }
        let recipient = self
            .find_by_name(&message.to)
            .ok_or_else(|| RegistryError::NotFound(message.to.clone()))?;
        if !recipient.status.can_receive() {
            return Err(RegistryError::Disconnected(message.to.clone()));
        }

        if let Some(sender) = self.find_by_name_mut(&message.from) {
            sender.counters.messages_sent += 1;
        }
        if let Some(recipient) = self.find_by_name_mut(&message.to) {
            recipient.counters.messages_received += 1;
        }

        let transport = Arc::clone(&self.transport);
        match transport.deliver(message) {
            Ok(()) => Ok(()),
            Err(e) => {
                if let Some(recipient) = self.find_by_name_mut(&message.to) {
                    recipient.counters.errors += 1;
                    recipient.counters.last_error_at = Some(Utc::now());
                }
                tracing::warn!(to = %message.to, error = %e, "delivery failed");
                Err(e.into())
            }
        }
    }

    /// Deliver `content` from `from` to every matching CI.
    ///
    /// Recipients are entries matching `role_filter` (all roles when
    /// `None`), excluding the sender and anything not ready or busy.
    /// Succeeds iff at least one delivery succeeded, returning how many.
    pub fn broadcast(
        &mut self,
        from: &str,
        role_filter: Option<Role>,
        kind: &str,
        content: &str,
    ) -> Result<usize, RegistryError> {
        if self.find_by_name(from).is_none() {
            return Err(RegistryError::NotFound(from.to_string()));
        }
        let recipients: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.name != from)
            .filter(|e| role_filter.map_or(true, |role| e.role == role))
            .filter(|e| e.status.can_receive())
            .map(|e| e.name.clone())
            .collect();

        let mut delivered = 0;
        for recipient in recipients {
            let message = CiMessage::new(from, recipient, kind, content);
            if self.send_message(&message).is_ok() {
                delivered += 1;
            }
        }
        if delivered == 0 {
            return Err(RegistryError::NoRecipients);
        }
        Ok(delivered)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
