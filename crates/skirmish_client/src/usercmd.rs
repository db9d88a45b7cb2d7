//! Locally generated input command history.

use skirmish_module_abi::views::UserCmdView;
use skirmish_module_abi::HostError;

pub const CMD_BACKUP: usize = 64;
pub const CMD_MASK: usize = CMD_BACKUP - 1;

pub struct UserCmdHistory {
    cmds: Vec<UserCmdView>,
    /// Number of the last properly generated command.
    cmd_number: i32,
    pub module_value: i32,
    pub sensitivity: f32,
}

impl Default for UserCmdHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl UserCmdHistory {
    pub fn new() -> Self {
        Self {
            cmds: vec![UserCmdView::default(); CMD_BACKUP],
            cmd_number: 0,
            module_value: 0,
            sensitivity: 1.0,
        }
    }

    pub fn current_number(&self) -> i32 {
        self.cmd_number
    }

    /// Input path: file the next generated command.
    pub fn record(&mut self, cmd: UserCmdView) {
        self.cmd_number += 1;
        self.cmds[(self.cmd_number as usize) & CMD_MASK] = cmd;
    }

    /// Retrieve command `number`. A number ahead of the latest generated
    /// one is a contract violation; one that has aged out of the wrapping
    /// buffer reports unavailable rather than returning stale data.
    pub fn get(&self, number: i32) -> Result<Option<UserCmdView>, HostError> {
        if self.cmd_number - number < 0 {
            return Err(HostError::drop_session(format!(
                "user command {number} requested ahead of {}",
                self.cmd_number,
            )));
        }
        if self.cmd_number - number >= CMD_BACKUP as i32 {
            return Ok(None);
        }
        Ok(Some(self.cmds[(number as usize) & CMD_MASK]))
    }

    /// Wipe buffered commands without disturbing the numbering; used when a
    /// level restart invalidates pending input.
    pub fn clear(&mut self) {
        self.cmds.fill(UserCmdView::default());
    }

    pub fn set_module_value(&mut self, value: i32, sensitivity: f32) {
        self.module_value = value;
        self.sensitivity = sensitivity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(server_time: i32) -> UserCmdView {
        UserCmdView {
            server_time,
            ..UserCmdView::default()
        }
    }

    #[test]
    fn requests_ahead_of_generation_are_rejected() {
        let mut history = UserCmdHistory::new();
        history.record(cmd(10));
        assert!(history.get(2).is_err());
    }

    #[test]
    fn aged_out_commands_are_unavailable_not_stale() {
        let mut history = UserCmdHistory::new();
        for n in 1..=(CMD_BACKUP as i32 + 8) {
            history.record(cmd(n));
        }
        let latest = history.current_number();
        assert_eq!(history.get(latest).unwrap().unwrap().server_time, latest);
        assert!(history.get(latest - CMD_BACKUP as i32).unwrap().is_none());
        assert_eq!(
            history
                .get(latest - CMD_BACKUP as i32 + 1)
                .unwrap()
                .unwrap()
                .server_time,
            latest - CMD_BACKUP as i32 + 1,
        );
    }

    #[test]
    fn clear_wipes_contents_but_keeps_numbering() {
        let mut history = UserCmdHistory::new();
        history.record(cmd(7));
        let latest = history.current_number();
        history.clear();
        assert_eq!(history.current_number(), latest);
        assert_eq!(history.get(latest).unwrap().unwrap().server_time, 0);
    }
}
