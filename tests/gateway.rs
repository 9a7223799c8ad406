//! Agent-facing tool catalog against a file-backed store

use std::io::Cursor;
use std::thread;

use agentboard::gateway::server::StdioServer;
use agentboard::{Database, MilestoneFilter, TaskFilter, TaskStatus, ToolGateway};
use serde_json::{json, Value};
use tempfile::TempDir;

fn board(dir: &TempDir) -> Database {
    Database::open_at(dir.path().join("board.db")).unwrap()
}

#[test]
fn test_agent_session_over_stdio() {
    let dir = TempDir::new().unwrap();
    let mut server = StdioServer::new(ToolGateway::new(board(&dir)));

    let requests = [
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
               "params": {"name": "create_milestone", "arguments": {"name": "Parser", "priority": 2}}}),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
               "params": {"name": "create_task", "arguments": {"milestone_id": 1, "title": "Lexer"}}}),
        json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call",
               "params": {"name": "create_milestone", "arguments": {"name": "Bad", "priority": "high"}}}),
    ];
    let input: String = requests.iter().map(|r| format!("{r}\n")).collect();
    let mut output = Vec::new();
    server.run(Cursor::new(input), &mut output).unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // The notification gets no reply
    assert_eq!(responses.len(), 4);
    assert!(server.is_initialized());
    assert_eq!(responses[1]["result"]["isError"], false);
    assert_eq!(responses[3]["result"]["isError"], true);

    let db = board(&dir);
    let milestones = db.list_milestones(&MilestoneFilter::default()).unwrap();
    assert_eq!(milestones.len(), 1);
    assert_eq!(milestones[0].priority, 2);
    assert_eq!(db.list_tasks(&TaskFilter::default()).unwrap().len(), 1);
}

#[test]
fn test_concurrent_agents_on_separate_handles() {
    let dir = TempDir::new().unwrap();
    let seed = ToolGateway::new(board(&dir));
    let m = seed.call("create_milestone", json!({"name": "Shared"})).unwrap();
    let mid = m["id"].as_i64().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|agent| {
            let path = dir.path().join("board.db");
            thread::spawn(move || {
                let gw = ToolGateway::new(Database::open_at(path).unwrap());
                for i in 0..5 {
                    let t = gw
                        .call(
                            "create_task",
                            json!({"milestone_id": mid, "title": format!("agent {agent} task {i}")}),
                        )
                        .unwrap();
                    gw.call("update_task", json!({"id": t["id"], "status": "done"}))
                        .unwrap();
                    gw.call(
                        "log_dialogue",
                        json!({"milestone_id": mid, "author": format!("agent-{agent}"),
                               "entry_type": "progress", "content": format!("finished {i}")}),
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let db = board(&dir);
    let tasks = db.list_tasks(&TaskFilter::default()).unwrap();
    assert_eq!(tasks.len(), 20);
    assert!(tasks
        .iter()
        .all(|t| t.status == TaskStatus::Done && t.completed_at.is_some()));
    assert_eq!(db.milestone_dialogue(mid as i32).unwrap().len(), 20);

    let status = seed.call("get_project_status", json!({})).unwrap();
    assert_eq!(status["task_counts"]["done"], 20);
    assert_eq!(status["total_milestones"], 1);
}

#[test]
fn test_rejected_call_leaves_store_untouched() {
    let dir = TempDir::new().unwrap();
    let gw = ToolGateway::new(board(&dir));
    let before = gw.call("get_project_status", json!({})).unwrap();

    assert!(gw
        .call("log_dialogue", json!({"milestone_id": 1, "author": "x", "entry_type": "rant", "content": "hi"}))
        .is_err());
    assert!(gw.call("update_task", json!({"id": "one"})).is_err());
    assert!(gw.call("not_a_tool", json!({})).is_err());

    let after = gw.call("get_project_status", json!({})).unwrap();
    assert_eq!(before, after);
}
