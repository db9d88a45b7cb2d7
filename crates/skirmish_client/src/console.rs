//! Host console: print log, notify lines, command registry, deferred
//! command buffer, and the tokenizer shared with the command-replay path.

use std::collections::{BTreeMap, VecDeque};

use skirmish_module_abi::ModuleRole;

/// Who answers a registered console command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOwner {
    Host,
    /// Reserved by a module: the host asks it through the claim entry
    /// point instead of executing anything itself.
    Module(ModuleRole),
}

const MAX_NOTIFY_LINES: usize = 4;

pub struct Console {
    pub open: bool,
    notify: VecDeque<String>,
    log: Vec<String>,
    commands: BTreeMap<String, CommandOwner>,
    /// Text queued for deferred execution after the current call returns.
    buffer: VecDeque<String>,
    current_text: String,
    current_args: Vec<String>,
}

impl Default for Console {
    fn default() -> Self {
        Self::new()
    }
}

impl Console {
    pub fn new() -> Self {
        Self {
            open: false,
            notify: VecDeque::new(),
            log: Vec::new(),
            commands: BTreeMap::new(),
            buffer: VecDeque::new(),
            current_text: String::new(),
            current_args: Vec::new(),
        }
    }

    pub fn print(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.notify.push_back(text.clone());
        while self.notify.len() > MAX_NOTIFY_LINES {
            self.notify.pop_front();
        }
        self.log.push(text);
    }

    pub fn notify_lines(&self) -> impl Iterator<Item = &str> {
        self.notify.iter().map(String::as_str)
    }

    pub fn log_lines(&self) -> &[String] {
        &self.log
    }

    pub fn clear_notify(&mut self) {
        self.notify.clear();
    }

    pub fn close(&mut self) {
        self.open = false;
        self.clear_notify();
    }

    pub fn register_host_command(&mut self, name: impl Into<String>) {
        self.commands.entry(name.into()).or_insert(CommandOwner::Host);
    }

    /// Module registration never displaces an existing owner.
    pub fn register_module_command(&mut self, name: impl Into<String>, role: ModuleRole) {
        self.commands
            .entry(name.into())
            .or_insert(CommandOwner::Module(role));
    }

    /// Only module-owned names may be removed from module context.
    pub fn remove_module_command(&mut self, name: &str) {
        if let Some(CommandOwner::Module(_)) = self.commands.get(name) {
            self.commands.remove(name);
        }
    }

    pub fn command_owner(&self, name: &str) -> Option<CommandOwner> {
        self.commands.get(name).copied()
    }

    pub fn queue_command(&mut self, text: impl Into<String>) {
        self.buffer.push_back(text.into());
    }

    pub fn drain_commands(&mut self) -> Vec<String> {
        self.buffer.drain(..).collect()
    }

    /// Discard anything still queued; stale text must not leak into a
    /// freshly started module.
    pub fn reset_buffer(&mut self) {
        self.buffer.clear();
    }

    /// Tokenize `text` into the current-command state the argc/argv traps
    /// read.
    pub fn tokenize_current(&mut self, text: &str) {
        self.current_text = text.to_string();
        self.current_args = tokenize(text);
    }

    /// Discard the current-command state.
    pub fn clear_tokens(&mut self) {
        self.current_text.clear();
        self.current_args.clear();
    }

    pub fn argc(&self) -> usize {
        self.current_args.len()
    }

    pub fn argv(&self, index: usize) -> &str {
        self.current_args
            .get(index)
            .map(String::as_str)
            .unwrap_or("")
    }

    /// Arguments from `first` on, joined by single spaces.
    pub fn args_from(&self, first: usize) -> String {
        if first >= self.current_args.len() {
            return String::new();
        }
        self.current_args[first..].join(" ")
    }
}

/// Split a command line into tokens. Double quotes group words; a `//`
/// outside quotes ends the line.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();
    loop {
        while matches!(chars.peek(), Some(c) if c.is_whitespace()) {
            chars.next();
        }
        match chars.peek() {
            None => break,
            Some('/') => {
                let mut probe = chars.clone();
                probe.next();
                if probe.peek() == Some(&'/') {
                    break;
                }
            }
            _ => {}
        }
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut token = String::new();
            for c in chars.by_ref() {
                if c == '"' {
                    break;
                }
                token.push(c);
            }
            tokens.push(token);
            continue;
        }
        let mut token = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                break;
            }
            token.push(c);
            chars.next();
        }
        tokens.push(token);
    }
    tokens
}
