use serde_json::{Map, Value};

pub type GameObject = Map<String, Value>;

const DROPPED_OBJECT_TYPES: [&str; 3] = ["ruin", "spawn", "constructionSite"];

const CONTROLLER_RESET_FIELDS: [&str; 10] = [
    "safeMode",
    "safeModeAvailable",
    "safeModeCooldown",
    "user",
    "isPowerEnabled",
    "downgradeTime",
    "progress",
    "progressTotal",
    "hits",
    "hitsMax",
];

fn object_type(object: &GameObject) -> Option<&str> {
    object.get("type").and_then(Value::as_str)
}

fn is_dropped(object: &GameObject) -> bool {
    object_type(object).is_some_and(|kind| DROPPED_OBJECT_TYPES.contains(&kind))
}

/// Clears ownership and progress from a controller and sets its level to 0.
/// Objects of any other type are left untouched.
pub fn reset_controller(object: &mut GameObject) {
    if object_type(object) != Some("controller") {
        return;
    }
    object.insert("level".to_string(), Value::from(0));
    for key in CONTROLLER_RESET_FIELDS {
        object.remove(key);
    }
}

pub fn sanitize_objects(objects: Vec<GameObject>) -> Vec<GameObject> {
    objects
        .into_iter()
        .filter(|object| !is_dropped(object))
        .map(|mut object| {
            reset_controller(&mut object);
            object
        })
        .collect()
}
