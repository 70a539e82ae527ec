use crate::plugin::PluginContext;
use mlua::{Lua, LuaOptions, StdLib, Table};
use std::cell::RefCell;
use std::path::PathBuf;
use std::time::Duration;

/// Which request lifecycle point a script hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Request,
    Response,
}

/// A sandboxed Lua 5.4 VM: only the safe subset of the standard library
/// is loaded (no `io`, `os`, or `package`), so a route-authored script
/// cannot touch the filesystem, spawn processes, or load arbitrary
/// native modules.
fn new_sandboxed_lua() -> mlua::Result<Lua> {
    let safe_libs = StdLib::STRING | StdLib::TABLE | StdLib::MATH;
    Lua::new_with(safe_libs, LuaOptions::new())
}

/// A thread-local pool of pre-created Lua VMs for one route, sized by
/// `LuaConfig::pool_size`. Checked out for the duration of one script
/// call and returned afterward; never shared across OS threads (mlua's
/// `Lua` type is `!Send` by default in the non-`send` feature
/// configuration the gateway uses, matching monoio's thread-per-core
/// model).
pub struct LuaPool {
    idle: RefCell<Vec<Lua>>,
    timeout: Duration,
    max_memory: usize,
}

pub struct LuaCheckout<'a> {
    pool: &'a LuaPool,
    lua: Option<Lua>,
}

impl Drop for LuaCheckout<'_> {
    fn drop(&mut self) {
        if let Some(lua) = self.lua.take() {
            self.pool.idle.borrow_mut().push(lua);
        }
    }
}

impl LuaPool {
    pub fn new(pool_size: usize, timeout: Duration, max_memory: usize) -> mlua::Result<Self> {
        let mut idle = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let lua = new_sandboxed_lua()?;
            if max_memory > 0 {
                lua.set_memory_limit(max_memory)?;
            }
            idle.push(lua);
        }
        Ok(Self { idle: RefCell::new(idle), timeout, max_memory })
    }

    pub fn checkout(&self) -> mlua::Result<LuaCheckout<'_>> {
        let lua = match self.idle.borrow_mut().pop() {
            Some(lua) => lua,
            None => {
                let lua = new_sandboxed_lua()?;
                if self.max_memory > 0 {
                    lua.set_memory_limit(self.max_memory)?;
                }
                lua
            }
        };
        Ok(LuaCheckout { pool: self, lua: Some(lua) })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// Build the `ctx` table passed to a script: a subset of
/// `PluginContext` exposed as Lua-readable/writable fields. Scripts
/// mutate `ctx.request_headers`/`ctx.response_headers`/`ctx.vars`
/// tables in place; the host reads them back after the call.
fn build_ctx_table(lua: &Lua, ctx: &PluginContext) -> mlua::Result<Table> {
    let table = lua.create_table()?;
    table.set("method", ctx.method.clone())?;
    table.set("path", ctx.path.clone())?;
    table.set("route_id", ctx.route_id.clone())?;
    table.set("client_ip", ctx.client_ip.clone())?;
    table.set("request_id", ctx.request_id.clone())?;

    let headers = lua.create_table()?;
    for (k, v) in &ctx.request_headers {
        headers.set(k.clone(), v.clone())?;
    }
    table.set("request_headers", headers)?;

    let resp_headers = lua.create_table()?;
    for (k, v) in &ctx.response_headers {
        resp_headers.set(k.clone(), v.clone())?;
    }
    table.set("response_headers", resp_headers)?;

    if let Some(status) = ctx.response_status {
        table.set("response_status", status)?;
    }

    Ok(table)
}

fn apply_ctx_table(ctx: &mut PluginContext, table: &Table) -> mlua::Result<()> {
    if let Ok(headers) = table.get::<Table>("request_headers") {
        for pair in headers.pairs::<String, String>() {
            let (k, v) = pair?;
            ctx.request_headers.insert(k, v);
        }
    }
    if let Ok(headers) = table.get::<Table>("response_headers") {
        for pair in headers.pairs::<String, String>() {
            let (k, v) = pair?;
            ctx.response_headers.insert(k, v);
        }
    }
    if let Ok(status) = table.get::<u16>("response_status") {
        ctx.response_status = Some(status);
    }
    Ok(())
}

/// Run a script body of the form `function(ctx) ... return ctx end`
/// against the request/response context, with a wall-clock budget
/// enforced via mlua's instruction-count hook (since a blocking Lua
/// call cannot itself be raced against a monoio timeout without giving
/// the VM a chance to yield).
pub fn run_script(pool: &LuaPool, source: &str, ctx: &mut PluginContext) -> anyhow::Result<()> {
    let checkout = pool.checkout().map_err(|e| anyhow::anyhow!("lua checkout failed: {e}"))?;
    let lua = checkout.lua.as_ref().expect("checkout always holds a VM while alive");

    let start = std::time::Instant::now();
    let deadline = pool.timeout();
    let triggers = mlua::HookTriggers { every_nth_instruction: Some(1000), ..Default::default() };
    lua.set_hook(triggers, move |_lua, _debug| {
        if start.elapsed() > deadline {
            return Err(mlua::Error::RuntimeError("script exceeded time budget".to_string()));
        }
        Ok(mlua::VmState::Continue)
    });

    let table = build_ctx_table(lua, ctx).map_err(|e| anyhow::anyhow!("lua ctx build failed: {e}"))?;
    let func: mlua::Function = lua
        .load(source)
        .eval()
        .map_err(|e| anyhow::anyhow!("lua script load failed: {e}"))?;
    let result: Table = func
        .call(table)
        .map_err(|e| anyhow::anyhow!("lua script execution failed: {e}"))?;
    apply_ctx_table(ctx, &result).map_err(|e| anyhow::anyhow!("lua ctx apply failed: {e}"))?;

    lua.remove_hook();
    Ok(())
}

pub fn script_path_for(plugin_dir: &std::path::Path, route_id: &str, phase: ScriptPhase) -> PathBuf {
    let suffix = match phase {
        ScriptPhase::Request => "request.lua",
        ScriptPhase::Response => "response.lua",
    };
    plugin_dir.join(route_id).join(suffix)
}
