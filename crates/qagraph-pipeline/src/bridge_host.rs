//! Host session that talks to an external bridge process.
//!
//! The bridge is started through the platform shell and speaks line-delimited JSON
//! on stdin/stdout. Each request is `{"id":n,"op":"...","args":{...}}`; the reply
//! carries the same id and either `"ok"` with the result or
//! `"error":{"kind":"...","message":"..."}`.

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use qagraph_types::{HostError, ParamValue};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::host::{ActionHandle, HostResult, HostSession, NodeHandle, ParamHandle};

#[derive(Debug, Deserialize)]
struct WireError {
    kind: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    id: u64,
    #[serde(default)]
    ok: Option<Value>,
    #[serde(default)]
    error: Option<WireError>,
}

pub struct BridgeHost {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    next_id: u64,
}

impl BridgeHost {
    /// Start `command` through the shell and attach to its stdio.
    pub fn spawn(command: &str) -> HostResult<Self> {
        let mut cmd = shell_command(command);
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());

        let mut child = cmd.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HostError::Protocol("bridge stdin unavailable".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| HostError::Protocol("bridge stdout unavailable".into()))?;

        tracing::info!(command = %command, pid = child.id(), "Host bridge started");
        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            next_id: 0,
        })
    }

    fn call(&mut self, op: &str, args: Value) -> HostResult<Value> {
        self.next_id += 1;
        let id = self.next_id;
        let line = encode_request(id, op, args);
        tracing::debug!(id, op, "Bridge request");

        self.stdin.write_all(line.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply)? == 0 {
            return Err(HostError::Protocol(format!(
                "bridge closed its output while handling '{op}'"
            )));
        }
        decode_response(id, &reply)
    }

    fn call_handle(&mut self, op: &str, args: Value) -> HostResult<NodeHandle> {
        let value = self.call(op, args)?;
        value
            .as_u64()
            .map(NodeHandle)
            .ok_or_else(|| unexpected(op, "a node handle", &value))
    }

    fn call_string(&mut self, op: &str, args: Value) -> HostResult<String> {
        let value = self.call(op, args)?;
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| unexpected(op, "a string", &value))
    }

    fn call_bool(&mut self, op: &str, args: Value) -> HostResult<bool> {
        let value = self.call(op, args)?;
        value
            .as_bool()
            .ok_or_else(|| unexpected(op, "a boolean", &value))
    }

    fn call_strings(&mut self, op: &str, args: Value) -> HostResult<Vec<String>> {
        let value = self.call(op, args)?;
        serde_json::from_value(value.clone())
            .map_err(|_| unexpected(op, "a list of strings", &value))
    }
}

impl Drop for BridgeHost {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn shell_command(command: &str) -> Command {
    if cfg!(windows) {
        let mut cmd = Command::new("cmd");
        cmd.args(["/C", command]);
        cmd
    } else {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", command]);
        cmd
    }
}

fn encode_request(id: u64, op: &str, args: Value) -> String {
    json!({ "id": id, "op": op, "args": args }).to_string()
}

fn decode_response(expected_id: u64, line: &str) -> HostResult<Value> {
    let response: WireResponse = serde_json::from_str(line.trim())
        .map_err(|e| HostError::Protocol(format!("invalid bridge reply: {e}")))?;
    if response.id != expected_id {
        return Err(HostError::Protocol(format!(
            "reply id {} does not match request id {expected_id}",
            response.id
        )));
    }
    match (response.ok, response.error) {
        (_, Some(err)) => Err(map_error(err)),
        (Some(value), None) => Ok(value),
        (None, None) => Ok(Value::Null),
    }
}

fn map_error(err: WireError) -> HostError {
    match err.kind.as_str() {
        "unknown_node_type" => HostError::UnknownNodeType(err.message),
        "unknown_handle" => match err.message.trim().parse() {
            Ok(handle) => HostError::UnknownHandle(handle),
            Err(_) => HostError::OperationFailed(err.message),
        },
        "cook_failed" => HostError::CookFailed(err.message),
        _ => HostError::OperationFailed(format!("{}: {}", err.kind, err.message)),
    }
}

fn unexpected(op: &str, expected: &str, got: &Value) -> HostError {
    HostError::Protocol(format!("'{op}' returned {got}, expected {expected}"))
}

impl HostSession for BridgeHost {
    fn create_node(&mut self, type_name: &str) -> HostResult<NodeHandle> {
        self.call_handle("create_node", json!({ "type_name": type_name }))
    }

    fn destroy_node(&mut self, node: NodeHandle) -> HostResult<()> {
        self.call("destroy_node", json!({ "node": node })).map(drop)
    }

    fn connect_input(&mut self, node: NodeHandle, upstream: NodeHandle) -> HostResult<()> {
        self.call(
            "connect_input",
            json!({ "node": node, "upstream": upstream, "slot": 0 }),
        )
        .map(drop)
    }

    fn node_name(&mut self, node: NodeHandle) -> HostResult<String> {
        self.call_string("node_name", json!({ "node": node }))
    }

    fn node_type(&mut self, node: NodeHandle) -> HostResult<String> {
        self.call_string("node_type", json!({ "node": node }))
    }

    fn get_parameter(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ParamHandle>> {
        let exists = self.call_bool("get_parameter", json!({ "node": node, "name": name }))?;
        Ok(exists.then(|| ParamHandle {
            node,
            name: name.to_string(),
        }))
    }

    fn set_parameter_value(&mut self, param: &ParamHandle, value: &ParamValue) -> HostResult<()> {
        self.call(
            "set_parameter",
            json!({ "node": param.node, "name": param.name, "value": value }),
        )
        .map(drop)
    }

    fn parameter_value(&mut self, param: &ParamHandle) -> HostResult<ParamValue> {
        let value = self.call(
            "parameter_value",
            json!({ "node": param.node, "name": param.name }),
        )?;
        ParamValue::from_json(&value)
            .ok_or_else(|| unexpected("parameter_value", "a scalar", &value))
    }

    fn get_trigger(&mut self, node: NodeHandle, name: &str) -> HostResult<Option<ActionHandle>> {
        let exists = self.call_bool("get_trigger", json!({ "node": node, "name": name }))?;
        Ok(exists.then(|| ActionHandle {
            node,
            name: name.to_string(),
        }))
    }

    fn fire_trigger(&mut self, trigger: &ActionHandle) -> HostResult<()> {
        self.call(
            "fire_trigger",
            json!({ "node": trigger.node, "name": trigger.name }),
        )
        .map(drop)
    }

    fn cook(&mut self, node: NodeHandle) -> HostResult<()> {
        self.call("cook", json!({ "node": node })).map(drop)
    }

    fn warnings(&mut self, node: NodeHandle) -> HostResult<Vec<String>> {
        self.call_strings("warnings", json!({ "node": node }))
    }

    fn errors(&mut self, node: NodeHandle) -> HostResult<Vec<String>> {
        self.call_strings("errors", json!({ "node": node }))
    }

    fn inputs(&mut self, node: NodeHandle) -> HostResult<Vec<NodeHandle>> {
        let value = self.call("inputs", json!({ "node": node }))?;
        serde_json::from_value(value.clone())
            .map_err(|_| unexpected("inputs", "a list of handles", &value))
    }

    fn layout(&mut self) -> HostResult<()> {
        self.call("layout", json!({})).map(drop)
    }

    fn save_scene(&mut self, path: &Path) -> HostResult<()> {
        let path = path.to_string_lossy().replace('\\', "/");
        self.call("save_scene", json!({ "path": path })).map(drop)
    }
}
