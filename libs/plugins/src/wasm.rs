//! WASM plugin transport.
//!
//! A plugin module exports `alloc(size) -> ptr` and
//! `on_connect(ptr, len) -> packed` where `packed` is
//! `ptr << 32 | len` of the JSON response written into the module's
//! memory. WASI preview1 imports are available to the module; an
//! exported `_initialize` runs once at load.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use wasmtime::{Engine, Linker, Memory, Module, Store, TypedFunc};
use wasmtime_wasi::preview1::{self, WasiP1Ctx};
use wasmtime_wasi::WasiCtxBuilder;

use crate::types::{ConnectRequest, ConnectResponse, Plugin};
use crate::PluginError;

struct ModuleState {
    store: Store<WasiP1Ctx>,
    memory: Memory,
    alloc: TypedFunc<u32, u32>,
    on_connect: TypedFunc<(u32, u32), u64>,
}

/// A plugin backed by an embedded WASM module.
///
/// Guest calls are serialized: the module instance is single-threaded
/// and runs on the blocking pool so a busy guest never stalls the
/// executor.
pub struct WasmPlugin {
    name: String,
    state: Arc<Mutex<ModuleState>>,
}

impl WasmPlugin {
    /// Load a module from a file path.
    pub fn load(name: impl Into<String>, path: &str) -> Result<Self, PluginError> {
        let name = name.into();
        let bytes = std::fs::read(path).map_err(|e| PluginError::LoadFailed {
            name: name.clone(),
            message: format!("read {path}: {e}"),
        })?;
        Self::from_bytes(name, &bytes)
    }

    /// Instantiate a module from raw bytes (binary or text format).
    pub fn from_bytes(name: impl Into<String>, bytes: &[u8]) -> Result<Self, PluginError> {
        let name = name.into();
        let load_failed = |message: String| PluginError::LoadFailed {
            name: name.clone(),
            message,
        };

        let engine = Engine::default();
        let module = Module::new(&engine, bytes).map_err(|e| load_failed(e.to_string()))?;

        let mut linker: Linker<WasiP1Ctx> = Linker::new(&engine);
        preview1::add_to_linker_sync(&mut linker, |ctx| ctx)
            .map_err(|e| load_failed(e.to_string()))?;

        let wasi = WasiCtxBuilder::new().build_p1();
        let mut store = Store::new(&engine, wasi);
        let instance = linker
            .instantiate(&mut store, &module)
            .map_err(|e| load_failed(e.to_string()))?;

        if let Some(init) = instance.get_func(&mut store, "_initialize") {
            init.call(&mut store, &[], &mut [])
                .map_err(|e| load_failed(e.to_string()))?;
        }

        let alloc = instance
            .get_typed_func::<u32, u32>(&mut store, "alloc")
            .map_err(|_| load_failed("missing export: alloc".into()))?;
        let on_connect = instance
            .get_typed_func::<(u32, u32), u64>(&mut store, "on_connect")
            .map_err(|_| load_failed("missing export: on_connect".into()))?;
        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| load_failed("missing export: memory".into()))?;

        Ok(WasmPlugin {
            name,
            state: Arc::new(Mutex::new(ModuleState {
                store,
                memory,
                alloc,
                on_connect,
            })),
        })
    }
}

#[async_trait]
impl Plugin for WasmPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_connect(&self, req: ConnectRequest) -> Result<ConnectResponse, PluginError> {
        let body = serde_json::to_vec(&req).map_err(|e| PluginError::CallFailed(e.to_string()))?;
        let state = Arc::clone(&self.state);

        let response = tokio::task::spawn_blocking(move || -> Result<Vec<u8>, String> {
            let mut guard = state.lock().map_err(|_| "module lock poisoned".to_string())?;
            let state = &mut *guard;
            let (alloc, on_connect, memory) =
                (state.alloc.clone(), state.on_connect.clone(), state.memory);
            let store = &mut state.store;

            let ptr = alloc
                .call(&mut *store, body.len() as u32)
                .map_err(|e| e.to_string())?;
            memory
                .write(&mut *store, ptr as usize, &body)
                .map_err(|e| e.to_string())?;

            let packed = on_connect
                .call(&mut *store, (ptr, body.len() as u32))
                .map_err(|e| e.to_string())?;
            let resp_ptr = (packed >> 32) as usize;
            let resp_len = (packed & 0xffff_ffff) as usize;

            let mut out = vec![0u8; resp_len];
            memory
                .read(&*store, resp_ptr, &mut out)
                .map_err(|e| e.to_string())?;
            Ok(out)
        })
        .await
        .map_err(|e| PluginError::CallFailed(e.to_string()))?
        .map_err(PluginError::CallFailed)?;

        serde_json::from_slice(&response).map_err(|e| PluginError::CallFailed(e.to_string()))
    }

    async fn close(&self) -> Result<(), PluginError> {
        Ok(())
    }
}
