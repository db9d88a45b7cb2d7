//! Cross-component scenarios for the client core.

use std::cell::RefCell;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use skirmish_module_abi::{HostError, ModuleRole, MAX_CALL_ARGS};
use skirmish_module_host::{HostSyscalls, ModuleBackend, ModuleMemory, NativeModuleSpec};

use crate::config::ClientConfig;
use crate::services::HostServices;
use crate::session::Session;

mod clock;
mod commands;
mod dispatch;

pub(crate) type ModuleBody = Rc<
    RefCell<
        dyn FnMut(
            &mut dyn HostSyscalls,
            &mut ModuleMemory,
            i32,
            [i32; MAX_CALL_ARGS],
        ) -> Result<i32, HostError>,
    >,
>;

pub(crate) struct ScriptedModule {
    body: ModuleBody,
}

impl ModuleBackend for ScriptedModule {
    fn main_entry(
        &mut self,
        host: &mut dyn HostSyscalls,
        memory: &mut ModuleMemory,
        op: i32,
        args: [i32; MAX_CALL_ARGS],
    ) -> Result<i32, HostError> {
        (self.body.borrow_mut())(host, memory, op, args)
    }
}

pub(crate) fn bare_session() -> Session {
    Session::new(&ClientConfig::default(), HostServices::default())
}

/// Session whose client-module slot resolves to a scripted native module.
pub(crate) fn session_with_module<F>(body: F) -> Session
where
    F: FnMut(
            &mut dyn HostSyscalls,
            &mut ModuleMemory,
            i32,
            [i32; MAX_CALL_ARGS],
        ) -> Result<i32, HostError>
        + 'static,
{
    let mut session = bare_session();
    let body: ModuleBody = Rc::new(RefCell::new(body));
    session.catalog.register(
        ModuleRole::GameClient,
        NativeModuleSpec::new(move || {
            Box::new(ScriptedModule { body: body.clone() })
        }),
    );
    session
}

pub(crate) fn register_ui_module<F>(session: &mut Session, body: F)
where
    F: FnMut(
            &mut dyn HostSyscalls,
            &mut ModuleMemory,
            i32,
            [i32; MAX_CALL_ARGS],
        ) -> Result<i32, HostError>
        + 'static,
{
    let body: ModuleBody = Rc::new(RefCell::new(body));
    session.catalog.register(
        ModuleRole::Ui,
        NativeModuleSpec::new(move || {
            Box::new(ScriptedModule { body: body.clone() })
        }),
    );
}

/// Stage a NUL-terminated string in the module arena; slots are 256 bytes.
pub(crate) fn stage_str(memory: &mut ModuleMemory, slot: i32, text: &str) -> i32 {
    let handle = memory.base() as i32 + slot * 256;
    let mut bytes = text.as_bytes().to_vec();
    bytes.push(0);
    memory.write(handle, &bytes).expect("staging string");
    handle
}

/// Stage a length-prefixed CBOR record in the module arena.
pub(crate) fn stage_record<T: Serialize>(memory: &mut ModuleMemory, slot: i32, value: &T) -> i32 {
    let handle = memory.base() as i32 + slot * 256;
    let bytes = serde_cbor::to_vec(value).expect("staging record");
    memory
        .write_i32(handle, bytes.len() as i32)
        .expect("staging record length");
    memory.write(handle + 4, &bytes).expect("staging record");
    handle
}

/// Read back a length-prefixed CBOR record the host wrote into the arena.
pub(crate) fn unstage_record<T: DeserializeOwned>(memory: &ModuleMemory, handle: i32) -> T {
    let len = memory.read_i32(handle).expect("record length");
    let bytes = memory
        .read(handle + 4, len as u32)
        .expect("record bytes");
    serde_cbor::from_slice(bytes).expect("record decode")
}

/// Read back a NUL-terminated string the host wrote into the arena.
pub(crate) fn unstage_str(memory: &ModuleMemory, handle: i32) -> String {
    memory.read_str(handle, 8192).expect("string read-back")
}
