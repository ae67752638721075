use serde_json::json;
use skel2d::{AnimationState, AnimationStateData, Physics, Skeleton, SkeletonData};
use std::path::PathBuf;
use std::sync::Arc;

const DEMO: &str = r#"
{
  "bones": [
    { "name": "root" },
    { "name": "arm", "parent": "root", "x": 10, "length": 30 },
    { "name": "hand", "parent": "arm", "x": 30 }
  ],
  "slots": [ { "name": "hand", "bone": "hand", "attachment": "fist" } ],
  "skins": [ { "name": "default", "attachments": { "hand": { "fist": { "width": 8, "height": 8 } } } } ],
  "animations": {
    "wave": {
      "bones": { "arm": { "rotate": [ { "time": 0, "value": -30 }, { "time": 1, "value": 30 } ] } }
    }
  }
}
"#;

fn load_skeleton_data(path: Option<&PathBuf>) -> Arc<SkeletonData> {
    let Some(path) = path else {
        return SkeletonData::from_json_str(DEMO).expect("parse demo");
    };
    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    if ext.eq_ignore_ascii_case("skel") {
        #[cfg(feature = "binary")]
        {
            let bytes = std::fs::read(path).expect("read skel");
            return SkeletonData::from_skel_bytes(&bytes).expect("parse skel");
        }
        #[cfg(not(feature = "binary"))]
        {
            panic!("Input is .skel but skel2d was built without feature `binary`.");
        }
    }

    let json = std::fs::read_to_string(path).expect("read json");
    SkeletonData::from_json_str(&json).expect("parse json")
}

/// Usage: `pose_dump [skeleton.json|skeleton.skel] [animation] [time]`
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = std::env::args().skip(1).collect::<Vec<_>>();
    let path = args.first().filter(|p| *p != "-").map(PathBuf::from);
    let animation = args.get(1).cloned().unwrap_or_else(|| "wave".to_string());
    let time: f32 = args.get(2).and_then(|t| t.parse().ok()).unwrap_or(0.5);

    let data = load_skeleton_data(path.as_ref());
    let mut skeleton = Skeleton::new(Arc::clone(&data));
    let mut state = AnimationState::new(Arc::new(AnimationStateData::new(Arc::clone(&data))));

    state
        .set_animation(0, &animation, true)
        .expect("set animation");
    state.update(time.max(0.0));
    state.apply(&mut skeleton).expect("apply animation");
    skeleton.update_world_transform(Physics::Update);

    let bones: Vec<_> = skeleton
        .bones()
        .iter()
        .zip(data.bones())
        .enumerate()
        .map(|(i, (bone, bone_data))| {
            json!({
                "i": i,
                "name": bone_data.name,
                "world": {"a": bone.a, "b": bone.b, "c": bone.c, "d": bone.d, "x": bone.world_x, "y": bone.world_y},
                "local": {"x": bone.x, "y": bone.y, "rotation": bone.rotation, "scaleX": bone.scale_x, "scaleY": bone.scale_y},
            })
        })
        .collect();

    let slots: Vec<_> = skeleton
        .slots()
        .iter()
        .zip(data.slots())
        .enumerate()
        .map(|(i, (slot, slot_data))| {
            json!({
                "i": i,
                "name": slot_data.name,
                "color": [slot.color.r, slot.color.g, slot.color.b, slot.color.a],
                "dark": slot.dark_color.map(|c| [c.r, c.g, c.b]),
                "attachment": slot.attachment_name(),
            })
        })
        .collect();

    let out = json!({
        "animation": animation,
        "time": time,
        "bones": bones,
        "slots": slots,
        "drawOrder": skeleton.draw_order(),
    });
    println!("{}", serde_json::to_string_pretty(&out).expect("serialize pose"));
}
