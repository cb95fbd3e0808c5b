//! One-JSON-file-per-plan store under `config_dir/plans/<uuid>.json`.

use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;

use crate::error::Result;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanStep {
    pub text: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub title: String,
    pub steps: Vec<PlanStep>,
}

fn plans_dir(config_dir: &Path) -> Result<PathBuf> {
    let dir = config_dir.join("plans");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

fn plan_path(config_dir: &Path, id: &str) -> Result<PathBuf> {
    Ok(plans_dir(config_dir)?.join(format!("{id}.json")))
}

fn write_plan(path: &Path, plan: &Plan) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(plan)?)?;
    Ok(())
}

pub fn create(config_dir: &Path, title: &str, steps: Vec<String>) -> Result<Value> {
    let id = uuid::Uuid::new_v4().to_string();
    let plan = Plan {
        id: id.clone(),
        title: title.to_string(),
        steps: steps
            .into_iter()
            .map(|text| PlanStep { text, status: "pending".to_string() })
            .collect(),
    };
    write_plan(&plan_path(config_dir, &id)?, &plan)?;
    Ok(json!({"id": plan.id, "title": plan.title, "steps": plan.steps}))
}

pub fn get(config_dir: &Path, id: &str) -> Result<Value> {
    let path = plan_path(config_dir, id)?;
    if !path.exists() {
        return Ok(json!({"error": "not found"}));
    }
    let plan: Plan = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(serde_json::to_value(plan)?)
}

pub fn list(config_dir: &Path) -> Result<Value> {
    let dir = plans_dir(config_dir)?;
    let mut plans = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Ok(text) = std::fs::read_to_string(entry.path()) else {
            continue;
        };
        let Ok(plan) = serde_json::from_str::<Plan>(&text) else {
            continue;
        };
        plans.push(json!({"id": plan.id, "title": plan.title, "steps": plan.steps}));
    }
    Ok(json!({"plans": plans}))
}

pub fn delete(config_dir: &Path, id: &str) -> Result<Value> {
    let path = plan_path(config_dir, id)?;
    if !path.exists() {
        return Ok(json!({"deleted": false, "reason": "not found"}));
    }
    std::fs::remove_file(&path)?;
    Ok(json!({"deleted": true, "id": id}))
}

pub fn add_step(config_dir: &Path, id: &str, text: &str) -> Result<Value> {
    let path = plan_path(config_dir, id)?;
    if !path.exists() {
        return Ok(json!({"error": "not found"}));
    }
    let mut plan: Plan = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    plan.steps.push(PlanStep { text: text.to_string(), status: "pending".to_string() });
    write_plan(&path, &plan)?;
    Ok(json!({"updated": true, "steps": plan.steps}))
}

pub fn update_step(config_dir: &Path, id: &str, index: usize, status: &str) -> Result<Value> {
    let path = plan_path(config_dir, id)?;
    if !path.exists() {
        return Ok(json!({"error": "not found"}));
    }
    let mut plan: Plan = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    let Some(step) = plan.steps.get_mut(index) else {
        return Ok(json!({"error": "index out of range"}));
    };
    step.status = status.to_string();
    write_plan(&path, &plan)?;
    Ok(json!({"updated": true, "steps": plan.steps}))
}

#[cfg(test)]
#[expect(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn create_then_get_round_trips_steps() {
        let dir = tempdir().unwrap();
        let created = create(dir.path(), "ship it", vec!["write code".into(), "test it".into()]).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let fetched = get(dir.path(), &id).unwrap();
        assert_eq!(fetched["steps"][0]["text"], "write code");
        assert_eq!(fetched["steps"][1]["status"], "pending");
    }

    #[test]
    fn update_step_reflected_in_next_get() {
        let dir = tempdir().unwrap();
        let created = create(dir.path(), "plan", vec!["a".into()]).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        update_step(dir.path(), &id, 0, "done").unwrap();
        let fetched = get(dir.path(), &id).unwrap();
        assert_eq!(fetched["steps"][0]["status"], "done");
    }

    #[test]
    fn add_step_appends_pending_step() {
        let dir = tempdir().unwrap();
        let created = create(dir.path(), "plan", vec![]).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        add_step(dir.path(), &id, "new step").unwrap();
        let fetched = get(dir.path(), &id).unwrap();
        assert_eq!(fetched["steps"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn delete_removes_plan_file() {
        let dir = tempdir().unwrap();
        let created = create(dir.path(), "plan", vec![]).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let del = delete(dir.path(), &id).unwrap();
        assert_eq!(del["deleted"], true);
        let fetched = get(dir.path(), &id).unwrap();
        assert_eq!(fetched["error"], "not found");
    }

    #[test]
    fn update_step_out_of_range_is_an_error_value() {
        let dir = tempdir().unwrap();
        let created = create(dir.path(), "plan", vec!["a".into()]).unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        let res = update_step(dir.path(), &id, 5, "done").unwrap();
        assert_eq!(res["error"], "index out of range");
    }
}
