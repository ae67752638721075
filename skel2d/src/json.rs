//! JSON skeleton loader.
//!
//! Bones, slots and attachments reference each other by name. Bone parents may be declared in
//! any order; the hierarchy is validated when the data is built.

use crate::{
    Animation, Attachment, AttachmentKey, AttachmentTimeline, BlendMode, BoneData, BoneTimeline,
    ClippingAttachment, Color, ColorTimeline, Curve, Error, Event, EventData, Inherit, Keyframe,
    LinkedMeshRef, MeshAttachment, MeshGeometry, MeshVertices, PhysicsConstraintData,
    RegionAttachment, SkeletonData, SkeletonDataBuilder, SlotData, VertexWeight,
};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

fn default_one() -> f32 {
    1.0
}

fn default_fps() -> f32 {
    60.0
}

fn default_strength() -> f32 {
    100.0
}

fn default_damping() -> f32 {
    5.0
}

#[derive(Debug, Deserialize)]
struct Root {
    #[serde(default)]
    skeleton: Option<SkeletonHeader>,
    #[serde(default)]
    bones: Vec<BoneDef>,
    #[serde(default)]
    slots: Vec<SlotDef>,
    #[serde(default)]
    skins: Vec<SkinDef>,
    #[serde(default)]
    events: BTreeMap<String, EventDef>,
    #[serde(default)]
    physics: Vec<PhysicsDef>,
    #[serde(default)]
    animations: BTreeMap<String, AnimationDef>,
}

#[derive(Debug, Deserialize)]
struct SkeletonHeader {
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BoneDef {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    length: f32,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_one", rename = "scaleX")]
    scale_x: f32,
    #[serde(default = "default_one", rename = "scaleY")]
    scale_y: f32,
    #[serde(default, rename = "shearX")]
    shear_x: f32,
    #[serde(default, rename = "shearY")]
    shear_y: f32,
    #[serde(default)]
    inherit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlotDef {
    name: String,
    bone: String,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    dark: Option<String>,
    #[serde(default)]
    attachment: Option<String>,
    #[serde(default)]
    blend: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SkinDef {
    name: String,
    #[serde(default)]
    attachments: BTreeMap<String, BTreeMap<String, AttachmentDef>>,
}

#[derive(Debug, Deserialize)]
struct AttachmentDef {
    #[serde(default, rename = "type")]
    attachment_type: Option<String>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    path: Option<String>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    rotation: f32,
    #[serde(default = "default_one", rename = "scaleX")]
    scale_x: f32,
    #[serde(default = "default_one", rename = "scaleY")]
    scale_y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default)]
    uvs: Vec<f32>,
    #[serde(default)]
    vertices: Vec<f32>,
    #[serde(default, rename = "vertexCount")]
    vertex_count: Option<usize>,
    #[serde(default)]
    triangles: Vec<u32>,
    #[serde(default)]
    hull: usize,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    skin: Option<String>,
    #[serde(default)]
    end: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct EventDef {
    #[serde(default, rename = "int")]
    int_value: i32,
    #[serde(default, rename = "float")]
    float_value: f32,
    #[serde(default, rename = "string")]
    string_value: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PhysicsDef {
    name: String,
    bone: String,
    #[serde(default = "default_one")]
    inertia: f32,
    #[serde(default = "default_strength")]
    strength: f32,
    #[serde(default = "default_damping")]
    damping: f32,
    #[serde(default = "default_one")]
    mass: f32,
    #[serde(default = "default_fps")]
    fps: f32,
    #[serde(default = "default_one")]
    mix: f32,
}

#[derive(Debug, Default, Deserialize)]
struct AnimationDef {
    #[serde(default)]
    bones: BTreeMap<String, BoneTimelinesDef>,
    #[serde(default)]
    slots: BTreeMap<String, SlotTimelinesDef>,
    #[serde(default)]
    events: Vec<EventKeyDef>,
}

#[derive(Debug, Default, Deserialize)]
struct BoneTimelinesDef {
    #[serde(default)]
    rotate: Vec<KeyDef>,
    #[serde(default)]
    translate: Vec<KeyDef>,
    #[serde(default)]
    scale: Vec<KeyDef>,
    #[serde(default)]
    shear: Vec<KeyDef>,
}

#[derive(Debug, Default, Deserialize)]
struct SlotTimelinesDef {
    #[serde(default)]
    attachment: Vec<AttachmentKeyDef>,
    #[serde(default)]
    rgba: Vec<KeyDef>,
    #[serde(default)]
    rgba2: Vec<KeyDef>,
}

#[derive(Debug, Deserialize)]
struct KeyDef {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    value: Option<f32>,
    #[serde(default)]
    x: Option<f32>,
    #[serde(default)]
    y: Option<f32>,
    #[serde(default)]
    color: Option<String>,
    #[serde(default)]
    light: Option<String>,
    #[serde(default)]
    dark: Option<String>,
    #[serde(default)]
    curve: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AttachmentKeyDef {
    #[serde(default)]
    time: f32,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventKeyDef {
    #[serde(default)]
    time: f32,
    name: String,
    #[serde(default, rename = "int")]
    int_value: Option<i32>,
    #[serde(default, rename = "float")]
    float_value: Option<f32>,
    #[serde(default, rename = "string")]
    string_value: Option<String>,
}

fn parse_inherit(raw: Option<&str>) -> Result<Inherit, Error> {
    Ok(match raw.unwrap_or("normal") {
        "normal" => Inherit::Normal,
        "onlyTranslation" => Inherit::OnlyTranslation,
        "noRotationOrReflection" => Inherit::NoRotationOrReflection,
        "noScale" => Inherit::NoScale,
        other => return Err(Error::invalid_data(format!("unknown inherit mode '{other}'"))),
    })
}

fn parse_blend(raw: Option<&str>) -> Result<BlendMode, Error> {
    Ok(match raw.unwrap_or("normal") {
        "normal" => BlendMode::Normal,
        "additive" => BlendMode::Additive,
        "multiply" => BlendMode::Multiply,
        "screen" => BlendMode::Screen,
        other => return Err(Error::invalid_data(format!("unknown blend mode '{other}'"))),
    })
}

fn parse_color(raw: Option<&str>, context: &str) -> Result<Color, Error> {
    match raw {
        None => Ok(Color::WHITE),
        Some(hex) => Color::from_hex(hex)
            .ok_or_else(|| Error::invalid_data(format!("{context}: invalid color '{hex}'"))),
    }
}

/// `RRGGBB` with alpha forced to 1. Missing means black.
fn parse_dark_color(raw: Option<&str>, context: &str) -> Result<Color, Error> {
    let color = parse_color(Some(raw.unwrap_or("000000")), context)?;
    Ok(Color { a: 1.0, ..color })
}

fn parse_curve(value: Option<&serde_json::Value>, context: &str) -> Result<Curve, Error> {
    let Some(value) = value else {
        return Ok(Curve::Linear);
    };
    if let Some(s) = value.as_str() {
        return match s {
            "stepped" => Ok(Curve::Stepped),
            "linear" => Ok(Curve::Linear),
            other => Err(Error::invalid_data(format!("{context}: unknown curve '{other}'"))),
        };
    }
    let numbers: Option<Vec<f32>> = value
        .as_array()
        .map(|arr| {
            arr.iter()
                .map(|v| v.as_f64().map(|n| n as f32))
                .collect::<Option<Vec<f32>>>()
        })
        .unwrap_or(None);
    match numbers.as_deref() {
        Some(&[cx1, cy1, cx2, cy2]) => Ok(Curve::Bezier { cx1, cy1, cx2, cy2 }),
        _ => Err(Error::invalid_data(format!(
            "{context}: curve must be \"stepped\" or 4 numbers"
        ))),
    }
}

struct Names {
    bones: HashMap<String, usize>,
    slots: HashMap<String, usize>,
}

impl Names {
    fn bone(&self, name: &str, context: &str) -> Result<usize, Error> {
        self.bones
            .get(name)
            .copied()
            .ok_or_else(|| Error::invalid_data(format!("{context}: unknown bone '{name}'")))
    }

    fn slot(&self, name: &str, context: &str) -> Result<usize, Error> {
        self.slots
            .get(name)
            .copied()
            .ok_or_else(|| Error::invalid_data(format!("{context}: unknown slot '{name}'")))
    }
}

fn read_vertices(
    raw: &[f32],
    vertex_count: usize,
    scale: f32,
    context: &str,
) -> Result<MeshVertices, Error> {
    if raw.len() == vertex_count * 2 {
        return Ok(MeshVertices::Unweighted(
            raw.chunks_exact(2)
                .map(|p| [p[0] * scale, p[1] * scale])
                .collect(),
        ));
    }

    // Weighted: per vertex a bone count followed by (bone, x, y, weight) per influence.
    let malformed = || Error::invalid_data(format!("{context}: malformed weighted vertices"));
    let mut out = Vec::with_capacity(vertex_count);
    let mut rest = raw;
    while let Some((&count, tail)) = rest.split_first() {
        if !count.is_finite() || count < 0.0 || count.fract() != 0.0 {
            return Err(malformed());
        }
        let len = (count as usize).checked_mul(4).ok_or_else(malformed)?;
        if tail.len() < len {
            return Err(malformed());
        }
        let (influences, tail) = tail.split_at(len);
        out.push(
            influences
                .chunks_exact(4)
                .map(|w| VertexWeight {
                    bone: w[0] as usize,
                    x: w[1] * scale,
                    y: w[2] * scale,
                    weight: w[3],
                })
                .collect(),
        );
        rest = tail;
    }
    if out.len() != vertex_count {
        return Err(malformed());
    }
    Ok(MeshVertices::Weighted(out))
}

enum ParsedAttachment {
    Ready(Attachment),
    Linked(LinkedMeshRef),
}

fn parse_attachment(
    key: &str,
    def: AttachmentDef,
    names: &Names,
    scale: f32,
    context: &str,
) -> Result<ParsedAttachment, Error> {
    let name = def.name.clone().unwrap_or_else(|| key.to_string());
    let path = def.path.clone().unwrap_or_else(|| name.clone());
    let color = parse_color(def.color.as_deref(), context)?;

    let attachment = match def.attachment_type.as_deref().unwrap_or("region") {
        "region" => {
            let mut region = RegionAttachment::new(name, def.width * scale, def.height * scale);
            region.path = path;
            region.color = color;
            region.x = def.x * scale;
            region.y = def.y * scale;
            region.rotation = def.rotation;
            region.scale_x = def.scale_x;
            region.scale_y = def.scale_y;
            Attachment::Region(region)
        }
        "mesh" => {
            if def.uvs.len() % 2 != 0 {
                return Err(Error::invalid_data(format!("{context}: odd uv count")));
            }
            let vertex_count = def.uvs.len() / 2;
            let triangles = def
                .triangles
                .iter()
                .map(|&i| u16::try_from(i))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|_| Error::invalid_data(format!("{context}: triangle index too large")))?;
            let geometry = MeshGeometry {
                vertices: read_vertices(&def.vertices, vertex_count, scale, context)?,
                uvs: def.uvs.chunks_exact(2).map(|uv| [uv[0], uv[1]]).collect(),
                triangles,
                hull_length: def.hull,
            };
            Attachment::Mesh(MeshAttachment {
                name,
                path,
                color,
                geometry: Arc::new(geometry),
            })
        }
        "linkedmesh" => {
            let parent = def
                .parent
                .ok_or_else(|| Error::invalid_data(format!("{context}: linked mesh without parent")))?;
            return Ok(ParsedAttachment::Linked(LinkedMeshRef {
                name,
                path,
                color,
                parent_skin: def.skin,
                parent,
            }));
        }
        "clipping" => {
            let vertex_count = def.vertex_count.unwrap_or(def.vertices.len() / 2);
            let end_slot = def
                .end
                .as_deref()
                .map(|end| names.slot(end, context))
                .transpose()?;
            Attachment::Clipping(ClippingAttachment {
                name,
                end_slot,
                vertices: read_vertices(&def.vertices, vertex_count, scale, context)?,
            })
        }
        other => {
            return Err(Error::invalid_data(format!(
                "{context}: unknown attachment type '{other}'"
            )));
        }
    };
    Ok(ParsedAttachment::Ready(attachment))
}

fn float_frames(keys: &[KeyDef], context: &str) -> Result<Vec<Keyframe<f32>>, Error> {
    keys.iter()
        .map(|k| {
            Ok(Keyframe::new(k.time, k.value.unwrap_or(0.0))
                .with_curve(parse_curve(k.curve.as_ref(), context)?))
        })
        .collect()
}

fn pair_frames(
    keys: &[KeyDef],
    default: f32,
    scale: f32,
    context: &str,
) -> Result<Vec<Keyframe<[f32; 2]>>, Error> {
    keys.iter()
        .map(|k| {
            let value = [
                k.x.unwrap_or(default) * scale,
                k.y.unwrap_or(default) * scale,
            ];
            Ok(Keyframe::new(k.time, value).with_curve(parse_curve(k.curve.as_ref(), context)?))
        })
        .collect()
}

fn parse_animation(
    name: String,
    def: AnimationDef,
    names: &Names,
    events: &[EventData],
    scale: f32,
) -> Result<Animation, Error> {
    let mut animation = Animation::new(name, 0.0);

    for (bone_name, timelines) in &def.bones {
        let context = format!("animation '{}', bone '{bone_name}'", animation.name);
        let bone = names.bone(bone_name, &context)?;
        if !timelines.rotate.is_empty() {
            animation.bone_timelines.push(BoneTimeline::Rotate {
                bone,
                frames: float_frames(&timelines.rotate, &context)?,
            });
        }
        if !timelines.translate.is_empty() {
            animation.bone_timelines.push(BoneTimeline::Translate {
                bone,
                frames: pair_frames(&timelines.translate, 0.0, scale, &context)?,
            });
        }
        if !timelines.scale.is_empty() {
            animation.bone_timelines.push(BoneTimeline::Scale {
                bone,
                frames: pair_frames(&timelines.scale, 1.0, 1.0, &context)?,
            });
        }
        if !timelines.shear.is_empty() {
            animation.bone_timelines.push(BoneTimeline::Shear {
                bone,
                frames: pair_frames(&timelines.shear, 0.0, 1.0, &context)?,
            });
        }
    }

    for (slot_name, timelines) in &def.slots {
        let context = format!("animation '{}', slot '{slot_name}'", animation.name);
        let slot = names.slot(slot_name, &context)?;
        if !timelines.attachment.is_empty() {
            let frames = timelines
                .attachment
                .iter()
                .map(|k| AttachmentKey {
                    time: k.time,
                    name: k.name.clone(),
                })
                .collect();
            animation
                .attachment_timelines
                .push(AttachmentTimeline { slot, frames });
        }
        if !timelines.rgba.is_empty() {
            let frames = timelines
                .rgba
                .iter()
                .map(|k| {
                    let color = parse_color(k.color.as_deref(), &context)?;
                    Ok(Keyframe::new(k.time, color).with_curve(parse_curve(k.curve.as_ref(), &context)?))
                })
                .collect::<Result<Vec<_>, Error>>()?;
            animation.color_timelines.push(ColorTimeline { slot, frames });
        }
        if !timelines.rgba2.is_empty() {
            let mut light = Vec::with_capacity(timelines.rgba2.len());
            let mut dark = Vec::with_capacity(timelines.rgba2.len());
            for k in &timelines.rgba2 {
                let curve = parse_curve(k.curve.as_ref(), &context)?;
                let color = parse_color(k.light.as_deref(), &context)?;
                light.push(Keyframe::new(k.time, color).with_curve(curve));
                let color = parse_dark_color(k.dark.as_deref(), &context)?;
                dark.push(Keyframe::new(k.time, color).with_curve(curve));
            }
            animation.color_timelines.push(ColorTimeline { slot, frames: light });
            animation
                .dark_color_timelines
                .push(ColorTimeline { slot, frames: dark });
        }
    }

    for key in def.events {
        let data = events.iter().find(|e| e.name == key.name).ok_or_else(|| {
            Error::invalid_data(format!(
                "animation '{}': unknown event '{}'",
                animation.name, key.name
            ))
        })?;
        let mut event = Event::from_data(data, key.time);
        if let Some(value) = key.int_value {
            event.int_value = value;
        }
        if let Some(value) = key.float_value {
            event.float_value = value;
        }
        if key.string_value.is_some() {
            event.string_value = key.string_value;
        }
        animation.events.push(event);
    }

    animation.duration = animation.last_key_time();
    Ok(animation)
}

impl SkeletonData {
    pub fn from_json_str(input: &str) -> Result<Arc<Self>, Error> {
        Self::from_json_str_with_scale(input, 1.0)
    }

    /// Loads JSON skeleton data, multiplying lengths and positions by `scale`.
    pub fn from_json_str_with_scale(input: &str, scale: f32) -> Result<Arc<Self>, Error> {
        let root: Root = serde_json::from_str(input).map_err(|e| Error::JsonParse {
            message: e.to_string(),
        })?;
        let scale = if scale.is_finite() { scale } else { 1.0 };

        let mut builder = SkeletonDataBuilder::new();
        builder.version = root.skeleton.and_then(|s| s.version);

        let mut names = Names {
            bones: root
                .bones
                .iter()
                .enumerate()
                .map(|(i, b)| (b.name.clone(), i))
                .collect(),
            slots: HashMap::new(),
        };

        for def in &root.bones {
            let parent = match def.parent.as_deref() {
                None => None,
                Some(parent) => Some(names.bones.get(parent).copied().ok_or_else(|| {
                    Error::InvalidHierarchy {
                        bone: def.name.clone(),
                        message: format!("unknown parent bone '{parent}'"),
                    }
                })?),
            };
            let mut bone = BoneData::new(def.name.clone(), parent);
            bone.length = def.length * scale;
            bone.x = def.x * scale;
            bone.y = def.y * scale;
            bone.rotation = def.rotation;
            bone.scale_x = def.scale_x;
            bone.scale_y = def.scale_y;
            bone.shear_x = def.shear_x;
            bone.shear_y = def.shear_y;
            bone.inherit = parse_inherit(def.inherit.as_deref())?;
            builder.add_bone(bone);
        }

        for def in root.slots {
            let context = format!("slot '{}'", def.name);
            let mut slot = SlotData::new(def.name.clone(), names.bone(&def.bone, &context)?);
            slot.color = parse_color(def.color.as_deref(), &context)?;
            slot.dark_color = def
                .dark
                .as_deref()
                .map(|dark| parse_dark_color(Some(dark), &context))
                .transpose()?;
            slot.attachment = def.attachment;
            slot.blend = parse_blend(def.blend.as_deref())?;
            let index = builder.add_slot(slot);
            names.slots.insert(def.name, index);
        }

        for def in root.physics {
            let context = format!("physics constraint '{}'", def.name);
            if !(def.mass > 0.0 && def.fps > 0.0) {
                return Err(Error::invalid_data(format!(
                    "{context}: mass and fps must be positive"
                )));
            }
            let mut constraint = PhysicsConstraintData::new(def.name, names.bone(&def.bone, &context)?);
            constraint.inertia = def.inertia;
            constraint.strength = def.strength;
            constraint.damping = def.damping;
            constraint.mass_inverse = 1.0 / def.mass;
            constraint.step = 1.0 / def.fps;
            constraint.mix = def.mix;
            builder.physics_constraints.push(constraint);
        }

        builder.events = root
            .events
            .into_iter()
            .map(|(name, def)| EventData {
                name,
                int_value: def.int_value,
                float_value: def.float_value,
                string_value: def.string_value,
            })
            .collect();

        for skin in root.skins {
            builder.skin_mut(&skin.name);
            for (slot_name, attachments) in skin.attachments {
                let slot = names.slot(&slot_name, &format!("skin '{}'", skin.name))?;
                for (key, def) in attachments {
                    let context = format!("skin '{}', slot '{slot_name}', attachment '{key}'", skin.name);
                    match parse_attachment(&key, def, &names, scale, &context)? {
                        ParsedAttachment::Ready(attachment) => {
                            builder.skin_mut(&skin.name).set_attachment(slot, key, attachment)
                        }
                        ParsedAttachment::Linked(mesh) => builder.add_linked_mesh(&skin.name, slot, mesh),
                    }
                }
            }
        }

        let mut animations = Vec::with_capacity(root.animations.len());
        for (name, def) in root.animations {
            animations.push(parse_animation(name, def, &names, &builder.events, scale)?);
        }
        builder.animations = animations;

        builder.build()
    }
}
