//! JSON command protocol for the AI agent.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use shared::OutputType;

use crate::harness::TestHarness;

fn default_idle_timeout_ms() -> u64 {
    10_000
}

fn default_cube_size() -> f32 {
    10.0
}

/// A command the AI agent can execute.
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum AgentCommand {
    /// Create a cube item and select it
    CreateCube {
        name: String,
        #[serde(default = "default_cube_size")]
        size: f32,
        #[serde(default)]
        position: [f32; 3],
    },
    /// Delete an item by ID, or the selection when no ID is given
    Delete {
        #[serde(default)]
        id: Option<String>,
    },
    /// Replace the selection with items by IDs.
    Select {
        ids: Vec<String>,
    },
    /// Extend the selection with one item.
    AddToSelection {
        id: String,
    },
    /// Clear selection.
    ClearSelection,
    /// Wrap the selection in a group.
    Group,
    /// Dissolve the selected group.
    Ungroup,
    /// Wrap the selection in a combine operation.
    Combine,
    /// Subtract `holes` (or the last selected item) from the selection.
    Subtract {
        #[serde(default)]
        holes: Vec<String>,
    },
    /// Copy the selection; linked copies stay synchronized.
    Duplicate {
        #[serde(default)]
        linked: bool,
    },
    /// Move an item by an offset.
    Translate {
        id: String,
        offset: [f32; 3],
    },
    /// Set the output type of the selected items.
    SetOutputType {
        output_type: OutputType,
    },
    /// Undo the last operation.
    Undo,
    /// Redo the last undone operation.
    Redo,
    /// Process background rebuilds until idle.
    Idle {
        #[serde(default = "default_idle_timeout_ms")]
        timeout_ms: u64,
    },
    /// Inspect the scene: list all top-level items.
    Inspect,
    /// Export the scene as JSON.
    ExportScene,
}

/// Response from executing a command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResponse {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
            data: None,
        }
    }

    fn ok_with_data(data: serde_json::Value) -> Self {
        Self {
            success: true,
            error: None,
            data: Some(data),
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(msg.into()),
            data: None,
        }
    }
}

fn respond<T, E: std::fmt::Display>(
    result: Result<T, E>,
    data: impl FnOnce(T) -> serde_json::Value,
) -> CommandResponse {
    match result {
        Ok(value) => CommandResponse::ok_with_data(data(value)),
        Err(e) => CommandResponse::err(e.to_string()),
    }
}

/// Execute a single command on the harness.
pub fn execute_command(harness: &mut TestHarness, cmd: AgentCommand) -> CommandResponse {
    match cmd {
        AgentCommand::CreateCube { name, size, position } => respond(
            harness.create_cube(&name, size, Vec3::from_array(position)),
            |id| serde_json::json!({ "id": id }),
        ),

        AgentCommand::Delete { id } => respond(harness.delete(id.as_deref()), |removed| {
            serde_json::json!({ "removed": removed })
        }),

        AgentCommand::Select { ids } => respond(harness.select(&ids), |_| {
            serde_json::json!({ "selected": ids })
        }),

        AgentCommand::AddToSelection { id } => {
            let result = harness.add_to_selection(&id);
            respond(result, |_| serde_json::json!({ "selected": harness.selected_ids() }))
        }

        AgentCommand::ClearSelection => {
            harness.clear_selection();
            CommandResponse::ok()
        }

        AgentCommand::Group => respond(harness.group(), |id| serde_json::json!({ "id": id })),

        AgentCommand::Ungroup => respond(harness.ungroup(), |ids| serde_json::json!({ "ids": ids })),

        AgentCommand::Combine => respond(harness.combine(), |id| serde_json::json!({ "id": id })),

        AgentCommand::Subtract { holes } => {
            respond(harness.subtract(holes), |id| serde_json::json!({ "id": id }))
        }

        AgentCommand::Duplicate { linked } => {
            respond(harness.duplicate(linked), |ids| serde_json::json!({ "ids": ids }))
        }

        AgentCommand::Translate { id, offset } => {
            respond(harness.translate(&id, Vec3::from_array(offset)), |_| {
                serde_json::json!({ "id": id })
            })
        }

        AgentCommand::SetOutputType { output_type } => {
            respond(harness.set_output_type(output_type), |_| {
                serde_json::json!({ "output_type": output_type })
            })
        }

        AgentCommand::Undo => {
            let success = harness.undo();
            CommandResponse::ok_with_data(serde_json::json!({ "undone": success }))
        }

        AgentCommand::Redo => {
            let success = harness.redo();
            CommandResponse::ok_with_data(serde_json::json!({ "redone": success }))
        }

        AgentCommand::Idle { timeout_ms } => {
            let idle = harness.idle(std::time::Duration::from_millis(timeout_ms));
            CommandResponse::ok_with_data(serde_json::json!({ "idle": idle }))
        }

        AgentCommand::Inspect => CommandResponse::ok_with_data(harness.inspect()),

        AgentCommand::ExportScene => respond(harness.export_scene_json(), |json| {
            serde_json::json!({ "scene_json": json })
        }),
    }
}

/// Parse and execute a single JSON command string.
pub fn execute_json(harness: &mut TestHarness, json: &str) -> Result<CommandResponse, String> {
    let cmd: AgentCommand =
        serde_json::from_str(json).map_err(|e| format!("Invalid command JSON: {e}"))?;
    Ok(execute_command(harness, cmd))
}

/// Parse and execute multiple JSON commands (array).
pub fn execute_json_batch(
    harness: &mut TestHarness,
    json: &str,
) -> Result<Vec<CommandResponse>, String> {
    let cmds: Vec<AgentCommand> =
        serde_json::from_str(json).map_err(|e| format!("Invalid commands JSON: {e}"))?;
    Ok(cmds
        .into_iter()
        .map(|cmd| execute_command(harness, cmd))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_serde_undo() {
        let json = r#"{"command": "undo"}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(cmd, AgentCommand::Undo));
    }

    #[test]
    fn test_command_serde_create_cube_defaults() {
        let json = r#"{"command": "create_cube", "name": "Cube1"}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        match cmd {
            AgentCommand::CreateCube { name, size, position } => {
                assert_eq!(name, "Cube1");
                assert_eq!(size, 10.0);
                assert_eq!(position, [0.0; 3]);
            }
            _ => panic!("Expected CreateCube"),
        }
    }

    #[test]
    fn test_command_serde_delete_without_id() {
        let cmd: AgentCommand = serde_json::from_str(r#"{"command": "delete"}"#).unwrap();
        assert!(matches!(cmd, AgentCommand::Delete { id: None }));
    }

    #[test]
    fn test_command_serde_select() {
        let json = r#"{"command": "select", "ids": ["a", "b"]}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        match cmd {
            AgentCommand::Select { ids } => assert_eq!(ids, vec!["a", "b"]),
            _ => panic!("Expected Select"),
        }
    }

    #[test]
    fn test_command_serde_set_output_type() {
        let json = r#"{"command": "set_output_type", "output_type": "hole"}"#;
        let cmd: AgentCommand = serde_json::from_str(json).unwrap();
        assert!(matches!(
            cmd,
            AgentCommand::SetOutputType { output_type: OutputType::Hole }
        ));
    }

    #[test]
    fn test_execute_create_cube() {
        let mut h = TestHarness::new();
        let json = r#"{"command": "create_cube", "name": "Cube1", "size": 2.0, "position": [1.0, 0.0, 0.0]}"#;

        let resp = execute_json(&mut h, json).unwrap();
        assert!(resp.success);
        assert_eq!(h.item_count(), 1);
        let id = resp.data.unwrap()["id"].as_str().unwrap().to_string();
        assert!(h.find(&id).is_ok());
    }

    #[test]
    fn test_execute_inspect() {
        let mut h = TestHarness::new();
        h.create_cube("c1", 1.0, Vec3::ZERO).unwrap();
        h.create_cube("c2", 2.0, Vec3::X * 4.0).unwrap();

        let resp = execute_json(&mut h, r#"{"command": "inspect"}"#).unwrap();
        assert!(resp.success);
        let data = resp.data.unwrap();
        assert_eq!(data["item_count"], 2);
    }

    #[test]
    fn test_execute_undo_redo() {
        let mut h = TestHarness::new();
        h.create_cube("c1", 1.0, Vec3::ZERO).unwrap();

        let resp = execute_json(&mut h, r#"{"command": "undo"}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["undone"], true);
        assert_eq!(h.item_count(), 0);

        let resp = execute_json(&mut h, r#"{"command": "redo"}"#).unwrap();
        assert!(resp.success);
        assert_eq!(resp.data.unwrap()["redone"], true);
        assert_eq!(h.item_count(), 1);
    }

    #[test]
    fn test_execute_unknown_id_reports_error() {
        let mut h = TestHarness::new();
        let resp = execute_json(&mut h, r#"{"command": "select", "ids": ["nope"]}"#).unwrap();
        assert!(!resp.success);
        assert!(resp.error.unwrap().contains("nope"));
    }

    #[test]
    fn test_execute_group_without_selection_fails() {
        let mut h = TestHarness::new();
        let resp = execute_json(&mut h, r#"{"command": "group"}"#).unwrap();
        assert!(!resp.success);
        assert_eq!(resp.error.as_deref(), Some("nothing selected"));
    }

    #[test]
    fn test_execute_batch_subtract() {
        let mut h = TestHarness::new();
        let block = h.create_cube("block", 10.0, Vec3::ZERO).unwrap();
        let hole = h.create_cube("hole", 2.0, Vec3::ZERO).unwrap();
        let batch = format!(
            r#"[{{"command": "select", "ids": ["{block}", "{hole}"]}},
                {{"command": "subtract"}},
                {{"command": "idle", "timeout_ms": 30000}}]"#
        );
        let responses = execute_json_batch(&mut h, &batch).unwrap();
        assert!(responses.iter().all(|r| r.success));
        assert_eq!(responses[2].data.as_ref().unwrap()["idle"], true);
        let op = h.scene.root().children()[0].clone();
        assert!((op.mesh().unwrap().volume() - 992.0).abs() < 1e-2);
    }

    #[test]
    fn test_execute_export_scene() {
        let mut h = TestHarness::new();
        h.create_cube("c1", 1.0, Vec3::ZERO).unwrap();

        let resp = execute_json(&mut h, r#"{"command": "export_scene"}"#).unwrap();
        assert!(resp.success);
        let data = resp.data.unwrap();
        let scene_json = data["scene_json"].as_str().unwrap();
        assert!(scene_json.contains("mesh_path"));
    }

    #[test]
    fn test_execute_invalid_json() {
        let mut h = TestHarness::new();
        let result = execute_json(&mut h, "not valid json");
        assert!(result.is_err());
    }
}
