//! Reliable server command replay.
//!
//! The transport delivers numbered command strings into a fixed ring; the
//! module asks for them in order through the command-fetch trap. Before a
//! command reaches the module, reserved first tokens are handled here:
//! disconnects, three-part big-string reassembly, configuration-string
//! sets, level restarts, and the development screenshot hook.

use skirmish_module_abi::HostError;

use crate::state::ClientCore;

pub const COMMAND_BACKUP: usize = 64;
pub const COMMAND_MASK: usize = COMMAND_BACKUP - 1;
/// Single-slot reassembly buffer capacity.
pub const BIG_COMMAND_CHARS: usize = 8192;
/// Expansion bound for the rescan loop; reassembly and configstring sets
/// re-enter tokenization at most this many times per fetched command.
pub const MAX_COMMAND_RESCANS: usize = 4;

pub struct ServerCommandRing {
    commands: Vec<String>,
    /// Commands that must be acknowledged but not executed.
    ignore: Vec<bool>,
    /// Latest received sequence.
    pub sequence: i32,
    pub last_executed: i32,
    /// Last-writer-wins accumulator for oversized commands.
    big_command: String,
}

impl Default for ServerCommandRing {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerCommandRing {
    pub fn new() -> Self {
        Self {
            commands: vec![String::new(); COMMAND_BACKUP],
            ignore: vec![false; COMMAND_BACKUP],
            sequence: 0,
            last_executed: 0,
            big_command: String::new(),
        }
    }

    /// Delivery path: file command `sequence`.
    pub fn record(&mut self, sequence: i32, text: &str) {
        let index = (sequence as usize) & COMMAND_MASK;
        self.commands[index] = text.to_string();
        self.ignore[index] = false;
        if sequence > self.sequence {
            self.sequence = sequence;
        }
    }

    /// Mark a stored command acknowledged-but-inert.
    pub fn set_ignored(&mut self, sequence: i32) {
        self.ignore[(sequence as usize) & COMMAND_MASK] = true;
    }
}

impl ClientCore {
    /// Fetch reliable command `number` for the module, applying the
    /// reserved-token side effects. `Ok(true)` means the tokenized command
    /// is ready for the module's own interpretation.
    pub fn get_server_command(&mut self, number: i32) -> Result<bool, HostError> {
        if self.server_commands.sequence - number >= COMMAND_BACKUP as i32 {
            // A demo recorded mid-session legitimately lacks the stream
            // prefix; stop feeding input instead of failing the session.
            if self.demo.playing {
                self.console.clear_tokens();
                return Ok(false);
            }
            return Err(HostError::drop_session(format!(
                "reliable command {number} was cycled out",
            )));
        }
        if self.server_commands.sequence - number < 0 {
            return Err(HostError::drop_session(format!(
                "reliable command {number} not yet received",
            )));
        }

        let index = (number as usize) & COMMAND_MASK;
        self.server_commands.last_executed = number;
        if self.server_commands.ignore[index] {
            self.console.clear_tokens();
            return Ok(false);
        }

        let mut text = self.server_commands.commands[index].clone();
        tracing::debug!(number, command = %text, "server command");

        for _ in 0..MAX_COMMAND_RESCANS {
            self.console.tokenize_current(&text);
            let command = self.console.argv(0).to_string();
            match command.as_str() {
                "disconnect" => {
                    // The server may say why it hung up; carry that through.
                    return Err(if self.console.argc() >= 2 {
                        HostError::disconnect(format!(
                            "server disconnected - {}",
                            self.console.argv(1),
                        ))
                    } else {
                        HostError::disconnect("server disconnected")
                    });
                }
                "bcs0" => {
                    let seeded = format!(
                        "cs {} \"{}",
                        self.console.argv(1),
                        self.console.argv(2),
                    );
                    if seeded.len() >= BIG_COMMAND_CHARS {
                        return Err(HostError::drop_session(
                            "big command exceeded the reassembly buffer",
                        ));
                    }
                    self.server_commands.big_command = seeded;
                    return Ok(false);
                }
                "bcs1" => {
                    let part = self.console.argv(2);
                    if self.server_commands.big_command.len() + part.len() >= BIG_COMMAND_CHARS {
                        return Err(HostError::drop_session(
                            "big command exceeded the reassembly buffer",
                        ));
                    }
                    let part = part.to_string();
                    self.server_commands.big_command.push_str(&part);
                    return Ok(false);
                }
                "bcs2" => {
                    let part = self.console.argv(2);
                    if self.server_commands.big_command.len() + part.len() + 1 >= BIG_COMMAND_CHARS
                    {
                        return Err(HostError::drop_session(
                            "big command exceeded the reassembly buffer",
                        ));
                    }
                    let part = part.to_string();
                    self.server_commands.big_command.push_str(&part);
                    self.server_commands.big_command.push('"');
                    // Replay the reassembled text as if it had arrived
                    // directly, without consuming a new sequence number.
                    text = std::mem::take(&mut self.server_commands.big_command);
                    continue;
                }
                "cs" => {
                    self.configstring_modified()?;
                    // The rebuild path may retokenize; restore this command
                    // before handing it over.
                    self.console.tokenize_current(&text);
                    return Ok(true);
                }
                "map_restart" => {
                    // Clear transient notify state and buffered input before
                    // the module sees the restart.
                    self.console.clear_notify();
                    self.console.tokenize_current(&text);
                    self.user_cmds.clear();
                    return Ok(true);
                }
                "levelshot" => {
                    // Development-only screenshot pass; honored only when
                    // the simulation authority runs in this process, so a
                    // remote server cannot overwrite local thumbnails.
                    if !self.sv_running {
                        return Ok(false);
                    }
                    self.console.close();
                    self.console.queue_command("screenshot levelshot");
                    return Ok(true);
                }
                _ => return Ok(true),
            }
        }
        Err(HostError::drop_session(
            "command rescan expansion limit exceeded",
        ))
    }

    /// Handle a `cs <index> <value>` set: rebuild the string table.
    fn configstring_modified(&mut self) -> Result<(), HostError> {
        let index: usize = self.console.argv(1).parse().map_err(|_| {
            HostError::drop_session(format!(
                "bad configstring index '{}'",
                self.console.argv(1),
            ))
        })?;
        let value = self.console.args_from(2);
        self.game_state.set(index, &value)?;
        Ok(())
    }
}
