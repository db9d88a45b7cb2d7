//! Simulation clock derivation.
//!
//! Each frame derives the module-visible server time from wall time, a
//! drifting delta, and the user-tunable nudge. The delta is corrected only
//! when a new snapshot actually arrived, which keeps the adjustment
//! framerate independent and prevents overcorrection during packet loss.

use skirmish_module_abi::HostError;

use crate::services::DemoMessage;
use crate::state::{ClientCore, ConnectionState};

/// Discrepancy beyond which the delta snaps instead of drifting.
pub const RESET_TIME_MS: i64 = 500;
/// Discrepancy beyond which the delta converges by halving.
pub const FAST_ADJUST_MS: i64 = 100;
/// Deterministic frame step for timed demos.
pub const TIMEDEMO_STEP_MS: i64 = 50;

#[derive(Debug, Clone, Copy, Default)]
pub struct ClockState {
    pub server_time: i64,
    pub server_time_delta: i64,
    pub old_server_time: i64,
    pub old_frame_server_time: i64,
    /// The previous frame ran past the latest snapshot; the next drift
    /// adjustment pulls back instead of creeping forward.
    pub extrapolated_snapshot: bool,
}

impl ClientCore {
    /// Effective nudge: either the configured fixed value, or one derived
    /// from the median of recent valid pings scaled by the auto factor.
    pub fn time_nudge(&self) -> i64 {
        let auto = self.cvars.value("cl_autoNudge");
        if auto != 0.0 {
            -(((self.avg_ping() * auto) + 0.5) as i64)
        } else {
            self.cvars.integer("cl_timeNudge") as i64
        }
    }

    /// Median of the plausible ping samples currently in the snapshot
    /// ring; the median resists outlier spikes where a mean would not.
    /// Even sample counts average the two central values.
    pub fn avg_ping(&self) -> f32 {
        let mut samples = self.snapshots.ping_samples();
        if samples.is_empty() {
            return 0.0;
        }
        samples.sort_unstable();
        let mid = samples.len() / 2;
        if samples.len() % 2 == 0 {
            (samples[mid] + samples[mid - 1]) as f32 / 2.0
        } else {
            samples[mid] as f32
        }
    }

    /// Per-frame clock step. Primes until the first live snapshot, then
    /// derives a non-decreasing server time and drift-corrects on snapshot
    /// arrival.
    pub fn set_game_time(&mut self) -> Result<(), HostError> {
        // A valid frame message is what ends the connection process.
        if self.connection != ConnectionState::Active {
            if self.connection != ConnectionState::Primed {
                return Ok(());
            }
            if self.demo.playing {
                // The first snapshot on the same frame as the gamestate
                // would cause a bad time skip.
                if !self.demo.first_frame_skipped {
                    self.demo.first_frame_skipped = true;
                    return Ok(());
                }
                self.read_demo_message();
            }
            if self.snapshots.new_snapshots {
                self.snapshots.new_snapshots = false;
                self.first_snapshot();
            }
            if self.connection != ConnectionState::Active {
                return Ok(());
            }
        }

        if !self.snapshots.latest.valid {
            return Err(HostError::drop_session(
                "active connection without a valid snapshot",
            ));
        }

        // Pause holds time still only for a local authority.
        if self.sv_paused && self.sv_running {
            return Ok(());
        }

        if self.snapshots.latest.server_time < self.clock.old_frame_server_time {
            return Err(HostError::drop_session(
                "snapshot server time ran backwards",
            ));
        }
        self.clock.old_frame_server_time = self.snapshots.latest.server_time;

        let timescale = self.cvars.value("timescale");
        let demo_frozen = self.demo.playing && timescale == 0.0;
        if demo_frozen {
            // Locks a demo in place for single-frame advances.
            self.clock.server_time_delta -= self.frametime;
        } else {
            self.clock.server_time =
                self.realtime + self.clock.server_time_delta - self.time_nudge();

            // Time never flows backwards, even when the delta just
            // adjusted or the nudge changed.
            if self.clock.server_time < self.clock.old_server_time {
                self.clock.server_time = self.clock.old_server_time;
            }
            self.clock.old_server_time = self.clock.server_time;

            // Note if we are almost past the latest frame (nudge aside) so
            // the next adjustment pulls back a little.
            if self.realtime + self.clock.server_time_delta
                - self.snapshots.latest.server_time
                >= -5
            {
                self.clock.extrapolated_snapshot = true;
            }
        }

        // Drift only when a snapshot actually arrived this frame.
        if self.snapshots.new_snapshots {
            self.adjust_time_delta();
        }

        if !self.demo.playing {
            return Ok(());
        }

        // Demo playback keeps reading messages until there are snapshots
        // to interpolate between.
        if self.cvars.integer("timedemo") != 0 {
            if self.demo.timedemo_start == 0 {
                self.demo.timedemo_start = self.realtime;
            }
            self.demo.timedemo_frames += 1;
            self.clock.server_time =
                self.demo.timedemo_base + self.demo.timedemo_frames * TIMEDEMO_STEP_MS;
        }

        while self.clock.server_time >= self.snapshots.latest.server_time {
            if !self.read_demo_message() {
                return Ok(()); // end of demo
            }
            if self.connection != ConnectionState::Active {
                return Ok(());
            }
        }
        Ok(())
    }

    /// First snapshot without the not-active flag: hard-set the clock and
    /// flush the queued on-enter-world action exactly once.
    pub fn first_snapshot(&mut self) {
        if self.snapshots.latest.flags & crate::snapshot::SNAPSHOT_NOT_ACTIVE != 0 {
            return;
        }
        self.connection = ConnectionState::Active;

        self.clock.server_time_delta = self.snapshots.latest.server_time - self.realtime;
        self.clock.old_server_time = self.snapshots.latest.server_time;
        self.demo.timedemo_base = self.snapshots.latest.server_time;

        let action = self.cvars.string("cl_activeAction").to_string();
        if !action.is_empty() {
            self.console.queue_command(action);
            self.cvars.set("cl_activeAction", "");
        }
    }

    /// Drift the delta toward the newest snapshot's view of time.
    pub fn adjust_time_delta(&mut self) {
        self.snapshots.new_snapshots = false;

        // The delta never drifts when replaying a demo.
        if self.demo.playing {
            return;
        }

        let new_delta = self.snapshots.latest.server_time - self.realtime;
        let delta_delta = (new_delta - self.clock.server_time_delta).abs();
        let show = self.cvars.integer("cl_showTimeDelta") != 0;

        if delta_delta > RESET_TIME_MS {
            self.clock.server_time_delta = new_delta;
            self.clock.old_server_time = self.snapshots.latest.server_time;
            self.clock.server_time = self.snapshots.latest.server_time;
            if show {
                self.console.print("<RESET>");
            }
        } else if delta_delta > FAST_ADJUST_MS {
            // Fast convergence: cut the difference in half.
            if show {
                self.console.print("<FAST>");
            }
            self.clock.server_time_delta = (self.clock.server_time_delta + new_delta) >> 1;
        } else {
            // Slow drift, a millisecond or two per arrival. The +1/-2
            // granularity is wrong under scaled time, so skip it there.
            let timescale = self.cvars.value("timescale");
            if timescale == 0.0 || timescale == 1.0 {
                if self.clock.extrapolated_snapshot {
                    self.clock.extrapolated_snapshot = false;
                    self.clock.server_time_delta -= 2;
                } else {
                    self.clock.server_time_delta += 1;
                }
            }
        }

        if show {
            let delta = self.clock.server_time_delta;
            self.console.print(format!("{delta} "));
        }
    }

    /// Pull one message from the demo feed; false means the demo ended.
    fn read_demo_message(&mut self) -> bool {
        let Some(feed) = self.services.demo_feed.as_mut() else {
            self.connection = ConnectionState::Idle;
            return false;
        };
        match feed.read_message() {
            DemoMessage::Snapshot {
                snapshot,
                entities,
            } => {
                self.snapshots.record(snapshot, &entities);
                true
            }
            DemoMessage::End => {
                self.connection = ConnectionState::Idle;
                false
            }
        }
    }
}
