//! Received snapshot history.
//!
//! Snapshots land in a fixed ring addressed by sequence number; their
//! entities land in a separate, larger shared history ring each snapshot
//! references by base index and count. A snapshot is retrievable only
//! while both windows are still live.

use skirmish_module_abi::views::{EntityStateView, PlayerStateView, SnapshotView};
use skirmish_module_abi::HostError;

pub const SNAPSHOT_BACKUP: usize = 32;
pub const SNAPSHOT_MASK: usize = SNAPSHOT_BACKUP - 1;
pub const MAX_ENTITY_HISTORY: usize = 2048;
pub const ENTITY_HISTORY_MASK: usize = MAX_ENTITY_HISTORY - 1;
/// Entity copy-out ceiling per retrieved snapshot.
pub const MAX_SNAPSHOT_ENTITIES: usize = 256;

/// Snapshot flag: the server is not yet simulating this client.
pub const SNAPSHOT_NOT_ACTIVE: i32 = 0x0002;

/// One delivered, validated snapshot as stored host-side.
#[derive(Debug, Clone, Default)]
pub struct StoredSnapshot {
    pub valid: bool,
    pub message_num: i32,
    pub server_time: i64,
    pub ping: i32,
    pub flags: i32,
    pub area_mask: Vec<u8>,
    pub player_state: PlayerStateView,
    pub server_command_num: i32,
    /// Window into the shared entity history.
    pub entity_base: u32,
    pub entity_count: u32,
}

pub struct SnapshotHistory {
    snapshots: Vec<StoredSnapshot>,
    /// Most recent valid snapshot; the clock and retrieval window key off it.
    pub latest: StoredSnapshot,
    entities: Vec<EntityStateView>,
    /// Total entities ever written; the write cursor into the shared ring.
    entity_write: u32,
    /// Set by the delivery path, consumed once per frame by the clock.
    pub new_snapshots: bool,
}

impl Default for SnapshotHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotHistory {
    pub fn new() -> Self {
        Self {
            snapshots: vec![StoredSnapshot::default(); SNAPSHOT_BACKUP],
            latest: StoredSnapshot::default(),
            entities: vec![EntityStateView::default(); MAX_ENTITY_HISTORY],
            entity_write: 0,
            new_snapshots: false,
        }
    }

    /// Delivery path: store a validated snapshot and its entities. The
    /// transport owns sequencing; this only files what it is handed.
    pub fn record(&mut self, mut snapshot: StoredSnapshot, entities: &[EntityStateView]) {
        snapshot.valid = true;
        snapshot.entity_base = self.entity_write;
        snapshot.entity_count = entities.len() as u32;
        for entity in entities {
            let index = (self.entity_write as usize) & ENTITY_HISTORY_MASK;
            self.entities[index] = entity.clone();
            self.entity_write += 1;
        }
        let index = (snapshot.message_num as usize) & SNAPSHOT_MASK;
        self.snapshots[index] = snapshot.clone();
        if snapshot.message_num >= self.latest.message_num || !self.latest.valid {
            self.latest = snapshot;
        }
        self.new_snapshots = true;
    }

    pub fn current_numbers(&self) -> (i32, i64) {
        (self.latest.message_num, self.latest.server_time)
    }

    /// Retrieve snapshot `number`, copying its entity window out of the
    /// shared history. Requesting a number ahead of the latest is a
    /// protocol violation; anything that has merely aged out of either
    /// ring reports unavailable.
    pub fn get(&self, number: i32) -> Result<Option<SnapshotView>, HostError> {
        if self.latest.message_num - number < 0 {
            return Err(HostError::drop_session(format!(
                "snapshot {number} requested ahead of latest {}",
                self.latest.message_num,
            )));
        }
        if self.latest.message_num - number >= SNAPSHOT_BACKUP as i32 {
            return Ok(None);
        }
        let stored = &self.snapshots[(number as usize) & SNAPSHOT_MASK];
        if !stored.valid {
            return Ok(None);
        }
        // The snapshot slot may still be live while its entities have been
        // overwritten in their own ring.
        if self.entity_write - stored.entity_base >= MAX_ENTITY_HISTORY as u32 {
            return Ok(None);
        }

        let mut count = stored.entity_count as usize;
        if count > MAX_SNAPSHOT_ENTITIES {
            tracing::debug!(
                snapshot = stored.message_num,
                truncated = count - MAX_SNAPSHOT_ENTITIES,
                "snapshot entity list truncated"
            );
            count = MAX_SNAPSHOT_ENTITIES;
        }
        let entities = (0..count)
            .map(|i| self.entities[(stored.entity_base as usize + i) & ENTITY_HISTORY_MASK].clone())
            .collect();

        Ok(Some(SnapshotView {
            flags: stored.flags,
            server_time: stored.server_time,
            ping: stored.ping,
            server_command_sequence: stored.server_command_num,
            area_mask: stored.area_mask.clone(),
            player_state: stored.player_state.clone(),
            entities,
        }))
    }

    /// Ping samples from every slot currently holding a plausible value.
    pub fn ping_samples(&self) -> Vec<i32> {
        self.snapshots
            .iter()
            .filter(|snap| snap.ping > 0 && snap.ping < 999)
            .map(|snap| snap.ping)
            .collect()
    }
}
