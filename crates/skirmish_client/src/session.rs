//! Session lifecycle: wiring the client core, the module registry, and the
//! trap dispatcher together, and driving the loaded client module through
//! its entry points.

use skirmish_module_abi::{
    BackendKind, EntryOp, HostError, ModuleLimits, ModuleRole, MAX_TRAP_ARGS,
};
use skirmish_module_host::{
    call_module, create_module, restart_module, ImageStore, ModuleCaller, ModuleHandle,
    ModuleMemory, ModuleRegistry, NativeCatalog, SyscallSink,
};

use crate::config::ClientConfig;
use crate::cvar::{CVAR_ARCHIVE, CVAR_PROTECTED};
use crate::dispatcher::Dispatcher;
use crate::game_state::{info_value_for_key, CS_SERVERINFO};
use crate::services::HostServices;
use crate::state::{ClientCore, ConnectionState, KEYCATCH_GAME};
use crate::console::CommandOwner;

/// The dispatcher bound to a client core; what a running module's traps
/// land on.
pub struct ClientSyscalls<'a> {
    pub core: &'a mut ClientCore,
    pub dispatcher: &'a Dispatcher,
}

impl SyscallSink for ClientSyscalls<'_> {
    fn syscall(
        &mut self,
        registry: &mut ModuleRegistry,
        memory: &mut ModuleMemory,
        caller: ModuleCaller,
        trap: i32,
        args: &[i32; MAX_TRAP_ARGS],
    ) -> Result<i32, HostError> {
        self.dispatcher
            .dispatch(self.core, registry, memory, caller, trap, args)
    }
}

pub struct Session {
    pub core: ClientCore,
    pub registry: ModuleRegistry,
    pub dispatcher: Dispatcher,
    pub catalog: NativeCatalog,
    pub images: ImageStore,
    pub limits: ModuleLimits,
    client_module: Option<ModuleHandle>,
}

impl Session {
    pub fn new(config: &ClientConfig, services: HostServices) -> Self {
        let mut core = ClientCore::new(services);
        config.apply(&mut core.cvars);
        // Backend selection for the client module; protected so a module
        // cannot flip its own trust level.
        core.cvars
            .register("vm_game_client", "0", CVAR_ARCHIVE | CVAR_PROTECTED);
        core.console.register_host_command("moduleinfo");
        core.console.register_host_command("screenshot");

        Self {
            core,
            registry: ModuleRegistry::new(),
            dispatcher: Dispatcher::new(),
            catalog: NativeCatalog::new(),
            images: ImageStore::new(),
            limits: ModuleLimits::default(),
            client_module: None,
        }
    }

    pub fn client_module(&self) -> Option<ModuleHandle> {
        self.client_module
    }

    /// Invoke the client module's entry point through the bound dispatcher.
    fn call_client(&mut self, op: EntryOp, args: &[i32]) -> Result<i32, HostError> {
        let mut sink = ClientSyscalls {
            core: &mut self.core,
            dispatcher: &self.dispatcher,
        };
        call_module(&mut self.registry, &mut sink, self.client_module, op, args)
    }

    /// Load and initialize the client module for the current gamestate.
    pub fn start_client_module(&mut self) -> Result<(), HostError> {
        let started = std::time::Instant::now();
        self.core.console.reset_buffer();
        self.core.console.close();

        let info = self.core.game_state.get(CS_SERVERINFO);
        let map = info_value_for_key(info, "mapname");
        self.core.map_name = format!("maps/{map}");

        let kind = if self.core.cvars.integer("vm_game_client") != 0 {
            BackendKind::Interpreted
        } else {
            BackendKind::Native
        };
        let handle = create_module(
            &mut self.registry,
            ModuleRole::GameClient,
            kind,
            &self.catalog,
            &self.images,
            &self.limits,
        )
        .map_err(|err| {
            HostError::drop_session(format!("client module create failed: {err:?}"))
        })?;
        self.client_module = Some(handle);
        self.core.connection = ConnectionState::Loading;

        // Use the last executed command sequence rather than the latest
        // received one, or commands sent just before the gamestate drop.
        let init_args = [
            self.core.server_message_sequence,
            self.core.server_commands.last_executed,
            self.core.client_num,
        ];
        self.call_client(EntryOp::Init, &init_args)?;

        if !self.core.demo.playing && !self.core.cheat_server {
            self.core.cvars.set_cheat_state();
        }

        // The next user command prompts the first snapshot.
        self.core.connection = ConnectionState::Primed;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "client module initialized"
        );
        self.core.console.clear_notify();
        Ok(())
    }

    /// Shut the client module down and release everything it owned.
    pub fn shutdown_client_module(&mut self) -> Result<(), HostError> {
        self.core.keys.catcher &= !KEYCATCH_GAME;
        if self.client_module.is_none() {
            return Ok(());
        }
        let result = self.call_client(EntryOp::Shutdown, &[]);
        self.registry.free(ModuleRole::GameClient)?;
        self.client_module = None;
        self.core.services.vfs.close_all(ModuleRole::GameClient);
        result.map(|_| ())
    }

    /// Reload the client module's data without disturbing host wiring.
    pub fn restart_client_module(&mut self) -> Result<(), HostError> {
        let Some(handle) = self.client_module else {
            return Err(HostError::fatal("restart without a client module"));
        };
        let handle = restart_module(
            &mut self.registry,
            handle,
            &self.catalog,
            &self.images,
            &self.limits,
        )?;
        self.client_module = Some(handle);
        Ok(())
    }

    /// Ask the module whether it claims the currently tokenized console
    /// command. A module that is not loaded claims nothing.
    pub fn claim_console_command(&mut self) -> Result<bool, HostError> {
        if self.client_module.is_none() {
            return Ok(false);
        }
        Ok(self.call_client(EntryOp::ConsoleCommand, &[])? != 0)
    }

    /// Let the module render one frame at the derived server time.
    pub fn render_frame(&mut self, stereo_view: i32) -> Result<(), HostError> {
        let frame_args = [
            self.core.clock.server_time as i32,
            stereo_view,
            self.core.demo.playing as i32,
        ];
        self.call_client(EntryOp::DrawActiveFrame, &frame_args)?;
        Ok(())
    }

    /// One host frame: advance clocks, then let the module draw.
    pub fn advance_frame(&mut self, realtime: i64, stereo_view: i32) -> Result<(), HostError> {
        self.core.begin_frame(realtime);
        self.core.set_game_time()?;
        if self.client_module.is_some() {
            self.render_frame(stereo_view)?;
        }
        Ok(())
    }

    /// Execute one console command line: host commands run here, reserved
    /// module names go through the claim entry point, anything else is
    /// reported unknown.
    pub fn execute_command(&mut self, text: &str) -> Result<(), HostError> {
        self.core.console.tokenize_current(text);
        if self.core.console.argc() == 0 {
            return Ok(());
        }
        let name = self.core.console.argv(0).to_string();
        match self.core.console.command_owner(&name) {
            Some(CommandOwner::Host) => match name.as_str() {
                "moduleinfo" => {
                    let info = self.module_info();
                    self.core.console.print(info);
                }
                "screenshot" => {
                    tracing::info!(args = %self.core.console.args_from(1), "screenshot requested");
                    self.core.services.screen.update_screen();
                }
                _ => {}
            },
            Some(CommandOwner::Module(_)) => {
                if !self.claim_console_command()? {
                    tracing::debug!(command = %name, "module declined reserved command");
                }
            }
            None => {
                let line = format!("unknown command \"{name}\"");
                self.core.console.print(line);
            }
        }
        Ok(())
    }

    /// Drain and execute everything modules queued for deferred execution.
    pub fn pump_commands(&mut self) -> Result<(), HostError> {
        for text in self.core.console.drain_commands() {
            self.execute_command(&text)?;
        }
        Ok(())
    }

    /// Recover from a session-scoped failure: tear down every module under
    /// the forced-unload flag and return to idle. Unrecoverable contract
    /// violations pass through.
    pub fn recover(&mut self, error: HostError) -> Result<(), HostError> {
        let reason = match error {
            HostError::Fatal { .. } => return Err(error),
            HostError::DropSession { ref reason } => format!("session dropped: {reason}"),
            HostError::Disconnect { ref reason } => reason.clone(),
        };
        self.registry.begin_forced_unload();
        let freed = self.registry.free_all();
        self.registry.end_forced_unload();
        freed?;
        self.client_module = None;
        self.core.connection = ConnectionState::Idle;
        self.core.console.print(reason);
        Ok(())
    }

    /// Human-readable summary of the registered modules.
    pub fn module_info(&self) -> String {
        let mut out = String::from("Registered modules:\n");
        for role in ModuleRole::ALL {
            let Some(name) = self.registry.module_name(role) else {
                continue;
            };
            let kind = match self.registry.backend_kind(role) {
                Some(BackendKind::Native) => "native",
                Some(BackendKind::Interpreted) => "interpreted",
                None => "unknown",
            };
            out.push_str(&format!(
                "{name} : {kind}, call depth {}\n",
                self.registry.call_depth(role),
            ));
        }
        out
    }
}
