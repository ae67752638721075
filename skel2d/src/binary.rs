//! Binary skeleton loader.
//!
//! The loader is IO-free and works on an in-memory byte slice. All multi-byte numbers are
//! big-endian. Layout:
//!
//! ```text
//! magic "SKL2", version string "MAJOR.MINOR"
//! strings:    varint count, string*
//! bones:      varint count, (name, varint parent+1, f32 rotation x y scale_x scale_y
//!             shear_x shear_y length, u8 inherit)*
//! slots:      varint count, (name, varint bone, rgba8, string-ref attachment, u8 blend,
//!             bool dark, [rgb8 + unused byte])*
//! physics:    varint count, (name, varint bone, f32 inertia strength damping mass_inverse
//!             step mix)*
//! events:     varint count, (name, zigzag int, f32 float, string)*
//! skins:      varint count, (name, varint slot count, (varint slot, varint count,
//!             (string-ref name, u8 type, attachment)*)*)*
//! animations: varint count, (name, bone timelines, slot timelines, event keys)*
//!             slot timeline types: 0 attachment, 1 color, 2 dark color
//! ```
//!
//! Strings are a varint of `byte length + 1` (0 means none) followed by UTF-8. A string-ref is a
//! varint index + 1 into the string table.

use crate::version::{FORMAT_MAGIC, FORMAT_MAJOR};
use crate::{
    Animation, Attachment, AttachmentKey, AttachmentTimeline, BlendMode, BoneData, BoneTimeline,
    ClippingAttachment, Color, ColorTimeline, Curve, Error, Event, EventData, Inherit, Keyframe,
    LinkedMeshRef, MeshAttachment, MeshGeometry, MeshVertices, PhysicsConstraintData,
    RegionAttachment, SkeletonData, SkeletonDataBuilder, SlotData, VertexWeight,
};
use byteorder::{BigEndian, ByteOrder};
use std::sync::Arc;

const CURVE_LINEAR: u8 = 0;
const CURVE_STEPPED: u8 = 1;
const CURVE_BEZIER: u8 = 2;

const ATTACHMENT_REGION: u8 = 0;
const ATTACHMENT_MESH: u8 = 1;
const ATTACHMENT_LINKED_MESH: u8 = 2;
const ATTACHMENT_CLIPPING: u8 = 3;

const BONE_ROTATE: u8 = 0;
const BONE_TRANSLATE: u8 = 1;
const BONE_SCALE: u8 = 2;
const BONE_SHEAR: u8 = 3;

const SLOT_ATTACHMENT: u8 = 0;
const SLOT_COLOR: u8 = 1;
const SLOT_DARK_COLOR: u8 = 2;

#[derive(Clone, Debug)]
struct BinaryInput<'a> {
    bytes: &'a [u8],
    cursor: usize,
}

impl<'a> BinaryInput<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, cursor: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len().saturating_sub(self.cursor)
    }

    fn error(&self, message: impl std::fmt::Display) -> Error {
        Error::BinaryParse {
            message: format!("{message} at offset {}", self.cursor),
        }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], Error> {
        if self.remaining() < len {
            return Err(self.error(format!("unexpected EOF reading {len} bytes")));
        }
        let bytes = &self.bytes[self.cursor..self.cursor + len];
        self.cursor += len;
        Ok(bytes)
    }

    fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.take(1)?[0])
    }

    fn read_bool(&mut self) -> Result<bool, Error> {
        Ok(self.read_u8()? != 0)
    }

    fn read_f32(&mut self) -> Result<f32, Error> {
        Ok(BigEndian::read_f32(self.take(4)?))
    }

    fn read_varint(&mut self) -> Result<u32, Error> {
        let mut value = 0u32;
        for shift in (0..35).step_by(7) {
            let b = self.read_u8()?;
            value |= u32::from(b & 0x7F) << shift;
            if b & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(self.error("varint longer than 5 bytes"))
    }

    fn read_zigzag(&mut self) -> Result<i32, Error> {
        let value = self.read_varint()?;
        Ok((value >> 1) as i32 ^ -((value & 1) as i32))
    }

    fn read_index(&mut self) -> Result<usize, Error> {
        Ok(self.read_varint()? as usize)
    }

    /// Element count of a following list. Every element takes at least one byte, which bounds
    /// allocations for corrupt input.
    fn read_count(&mut self) -> Result<usize, Error> {
        let count = self.read_index()?;
        if count > self.remaining() {
            return Err(self.error(format!("count {count} exceeds remaining input")));
        }
        Ok(count)
    }

    /// Optional index stored as `index + 1`, with 0 meaning none.
    fn read_optional_index(&mut self) -> Result<Option<usize>, Error> {
        Ok(self.read_index()?.checked_sub(1))
    }

    fn read_string(&mut self) -> Result<Option<String>, Error> {
        let Some(len) = self.read_optional_index()? else {
            return Ok(None);
        };
        let start = self.cursor;
        let bytes = self.take(len)?;
        let s = std::str::from_utf8(bytes).map_err(|e| Error::BinaryParse {
            message: format!("invalid utf-8 in string at offset {start}: {e}"),
        })?;
        Ok(Some(s.to_string()))
    }

    fn read_name(&mut self, what: &str) -> Result<String, Error> {
        self.read_string()?
            .ok_or_else(|| self.error(format!("missing {what} name")))
    }

    fn read_string_ref<'s>(&mut self, strings: &'s [String]) -> Result<Option<&'s str>, Error> {
        let Some(index) = self.read_optional_index()? else {
            return Ok(None);
        };
        strings
            .get(index)
            .map(|s| Some(s.as_str()))
            .ok_or_else(|| self.error(format!("string ref {index} out of range ({})", strings.len())))
    }

    fn read_color(&mut self) -> Result<Color, Error> {
        let [r, g, b, a]: [u8; 4] = self.take(4)?.try_into().map_err(|_| self.error("short color"))?;
        Ok(Color::from_rgba8(r, g, b, a))
    }

    fn read_pair(&mut self, scale: f32) -> Result<[f32; 2], Error> {
        Ok([self.read_f32()? * scale, self.read_f32()? * scale])
    }
}

fn check_version(version: &str) -> Result<(), Error> {
    let major = version
        .split('.')
        .next()
        .and_then(|m| m.trim().parse::<u32>().ok());
    if major != Some(FORMAT_MAJOR) {
        return Err(Error::UnsupportedVersion {
            value: version.to_string(),
        });
    }
    Ok(())
}

fn map_inherit(input: &BinaryInput<'_>, value: u8) -> Result<Inherit, Error> {
    Ok(match value {
        0 => Inherit::Normal,
        1 => Inherit::OnlyTranslation,
        2 => Inherit::NoRotationOrReflection,
        3 => Inherit::NoScale,
        _ => return Err(input.error(format!("invalid inherit mode {value}"))),
    })
}

fn map_blend(input: &BinaryInput<'_>, value: u8) -> Result<BlendMode, Error> {
    Ok(match value {
        0 => BlendMode::Normal,
        1 => BlendMode::Additive,
        2 => BlendMode::Multiply,
        3 => BlendMode::Screen,
        _ => return Err(input.error(format!("invalid blend mode {value}"))),
    })
}

fn read_curve(input: &mut BinaryInput<'_>) -> Result<Curve, Error> {
    match input.read_u8()? {
        CURVE_LINEAR => Ok(Curve::Linear),
        CURVE_STEPPED => Ok(Curve::Stepped),
        CURVE_BEZIER => Ok(Curve::Bezier {
            cx1: input.read_f32()?,
            cy1: input.read_f32()?,
            cx2: input.read_f32()?,
            cy2: input.read_f32()?,
        }),
        other => Err(input.error(format!("invalid curve type {other}"))),
    }
}

fn read_frames<T>(
    input: &mut BinaryInput<'_>,
    mut read_value: impl FnMut(&mut BinaryInput<'_>) -> Result<T, Error>,
) -> Result<Vec<Keyframe<T>>, Error> {
    let count = input.read_count()?;
    let mut frames = Vec::with_capacity(count);
    for _ in 0..count {
        let time = input.read_f32()?;
        let value = read_value(input)?;
        let curve = read_curve(input)?;
        frames.push(Keyframe::new(time, value).with_curve(curve));
    }
    Ok(frames)
}

fn read_vertices(input: &mut BinaryInput<'_>, scale: f32) -> Result<MeshVertices, Error> {
    let count = input.read_count()?;
    if !input.read_bool()? {
        let mut points = Vec::with_capacity(count);
        for _ in 0..count {
            points.push(input.read_pair(scale)?);
        }
        return Ok(MeshVertices::Unweighted(points));
    }

    let mut vertices = Vec::with_capacity(count);
    for _ in 0..count {
        let bones = input.read_count()?;
        let mut weights = Vec::with_capacity(bones);
        for _ in 0..bones {
            let bone = input.read_index()?;
            let [x, y] = input.read_pair(scale)?;
            let weight = input.read_f32()?;
            weights.push(VertexWeight { bone, x, y, weight });
        }
        vertices.push(weights);
    }
    Ok(MeshVertices::Weighted(vertices))
}

fn read_mesh_geometry(input: &mut BinaryInput<'_>, scale: f32) -> Result<MeshGeometry, Error> {
    let hull_length = input.read_index()?;
    let vertices = read_vertices(input, scale)?;
    let mut uvs = Vec::with_capacity(vertices.len());
    for _ in 0..vertices.len() {
        uvs.push(input.read_pair(1.0)?);
    }
    let count = input.read_count()?;
    let mut triangles = Vec::with_capacity(count);
    for _ in 0..count {
        let index = input.read_varint()?;
        triangles.push(
            u16::try_from(index).map_err(|_| input.error(format!("triangle index {index} too large")))?,
        );
    }
    Ok(MeshGeometry {
        vertices,
        uvs,
        triangles,
        hull_length,
    })
}

enum ReadAttachment {
    Ready(Attachment),
    Linked(LinkedMeshRef),
}

fn read_attachment(
    input: &mut BinaryInput<'_>,
    strings: &[String],
    name: &str,
    scale: f32,
) -> Result<ReadAttachment, Error> {
    let kind = input.read_u8()?;
    if kind == ATTACHMENT_CLIPPING {
        let end_slot = input.read_optional_index()?;
        let vertices = read_vertices(input, scale)?;
        return Ok(ReadAttachment::Ready(Attachment::Clipping(ClippingAttachment {
            name: name.to_string(),
            end_slot,
            vertices,
        })));
    }

    let path = input.read_string_ref(strings)?.unwrap_or(name).to_string();
    let color = input.read_color()?;
    let attachment = match kind {
        ATTACHMENT_REGION => {
            let mut region = RegionAttachment::new(name, 0.0, 0.0);
            region.path = path;
            region.color = color;
            [region.x, region.y] = input.read_pair(scale)?;
            region.rotation = input.read_f32()?;
            [region.scale_x, region.scale_y] = input.read_pair(1.0)?;
            [region.width, region.height] = input.read_pair(scale)?;
            Attachment::Region(region)
        }
        ATTACHMENT_MESH => Attachment::Mesh(MeshAttachment {
            name: name.to_string(),
            path,
            color,
            geometry: Arc::new(read_mesh_geometry(input, scale)?),
        }),
        ATTACHMENT_LINKED_MESH => {
            let parent = input
                .read_string_ref(strings)?
                .ok_or_else(|| input.error(format!("linked mesh '{name}' has no parent")))?
                .to_string();
            let parent_skin = input.read_string_ref(strings)?.map(str::to_string);
            return Ok(ReadAttachment::Linked(LinkedMeshRef {
                name: name.to_string(),
                path,
                color,
                parent_skin,
                parent,
            }));
        }
        other => return Err(input.error(format!("invalid attachment type {other}"))),
    };
    Ok(ReadAttachment::Ready(attachment))
}

fn read_animation(
    input: &mut BinaryInput<'_>,
    strings: &[String],
    events: &[EventData],
    scale: f32,
) -> Result<Animation, Error> {
    let mut animation = Animation::new(input.read_name("animation")?, 0.0);

    for _ in 0..input.read_count()? {
        let kind = input.read_u8()?;
        let bone = input.read_index()?;
        let timeline = match kind {
            BONE_ROTATE => BoneTimeline::Rotate {
                bone,
                frames: read_frames(input, |i| i.read_f32())?,
            },
            BONE_TRANSLATE => BoneTimeline::Translate {
                bone,
                frames: read_frames(input, |i| i.read_pair(scale))?,
            },
            BONE_SCALE => BoneTimeline::Scale {
                bone,
                frames: read_frames(input, |i| i.read_pair(1.0))?,
            },
            BONE_SHEAR => BoneTimeline::Shear {
                bone,
                frames: read_frames(input, |i| i.read_pair(1.0))?,
            },
            other => return Err(input.error(format!("invalid bone timeline type {other}"))),
        };
        animation.bone_timelines.push(timeline);
    }

    for _ in 0..input.read_count()? {
        let kind = input.read_u8()?;
        let slot = input.read_index()?;
        match kind {
            SLOT_ATTACHMENT => {
                let count = input.read_count()?;
                let mut frames = Vec::with_capacity(count);
                for _ in 0..count {
                    let time = input.read_f32()?;
                    let name = input.read_string_ref(strings)?.map(str::to_string);
                    frames.push(AttachmentKey { time, name });
                }
                animation
                    .attachment_timelines
                    .push(AttachmentTimeline { slot, frames });
            }
            SLOT_COLOR => {
                let frames = read_frames(input, |i| i.read_color())?;
                animation.color_timelines.push(ColorTimeline { slot, frames });
            }
            SLOT_DARK_COLOR => {
                let frames = read_frames(input, |i| Ok(Color { a: 1.0, ..i.read_color()? }))?;
                animation
                    .dark_color_timelines
                    .push(ColorTimeline { slot, frames });
            }
            other => return Err(input.error(format!("invalid slot timeline type {other}"))),
        }
    }

    for _ in 0..input.read_count()? {
        let time = input.read_f32()?;
        let index = input.read_index()?;
        let data = events
            .get(index)
            .ok_or_else(|| input.error(format!("event index {index} out of range")))?;
        animation.events.push(Event::from_data(data, time));
    }

    animation.duration = animation.last_key_time();
    Ok(animation)
}

impl SkeletonData {
    pub fn from_skel_bytes(bytes: &[u8]) -> Result<Arc<Self>, Error> {
        Self::from_skel_bytes_with_scale(bytes, 1.0)
    }

    /// Loads binary skeleton data, multiplying lengths and positions by `scale`.
    pub fn from_skel_bytes_with_scale(bytes: &[u8], scale: f32) -> Result<Arc<Self>, Error> {
        let scale = if scale.is_finite() { scale } else { 1.0 };
        let mut input = BinaryInput::new(bytes);

        if input.take(FORMAT_MAGIC.len()).ok() != Some(FORMAT_MAGIC.as_slice()) {
            return Err(Error::BinaryParse {
                message: "missing skeleton binary magic".to_string(),
            });
        }
        let version = input.read_name("version")?;
        check_version(&version)?;

        let mut builder = SkeletonDataBuilder::new();
        builder.version = Some(version);

        let mut strings = Vec::new();
        for _ in 0..input.read_count()? {
            strings.push(input.read_string()?.unwrap_or_default());
        }

        for _ in 0..input.read_count()? {
            let mut bone = BoneData::new(input.read_name("bone")?, None);
            bone.parent = input.read_optional_index()?;
            bone.rotation = input.read_f32()?;
            [bone.x, bone.y] = input.read_pair(scale)?;
            [bone.scale_x, bone.scale_y] = input.read_pair(1.0)?;
            [bone.shear_x, bone.shear_y] = input.read_pair(1.0)?;
            bone.length = input.read_f32()? * scale;
            let inherit = input.read_u8()?;
            bone.inherit = map_inherit(&input, inherit)?;
            builder.add_bone(bone);
        }

        for _ in 0..input.read_count()? {
            let name = input.read_name("slot")?;
            let mut slot = SlotData::new(name, input.read_index()?);
            slot.color = input.read_color()?;
            slot.attachment = input.read_string_ref(&strings)?.map(str::to_string);
            let blend = input.read_u8()?;
            slot.blend = map_blend(&input, blend)?;
            if input.read_bool()? {
                slot.dark_color = Some(Color {
                    a: 1.0,
                    ..input.read_color()?
                });
            }
            builder.add_slot(slot);
        }

        for _ in 0..input.read_count()? {
            let name = input.read_name("physics constraint")?;
            let mut constraint = PhysicsConstraintData::new(name, input.read_index()?);
            constraint.inertia = input.read_f32()?;
            constraint.strength = input.read_f32()?;
            constraint.damping = input.read_f32()?;
            constraint.mass_inverse = input.read_f32()?;
            constraint.step = input.read_f32()?;
            constraint.mix = input.read_f32()?;
            builder.physics_constraints.push(constraint);
        }

        for _ in 0..input.read_count()? {
            builder.events.push(EventData {
                name: input.read_name("event")?,
                int_value: input.read_zigzag()?,
                float_value: input.read_f32()?,
                string_value: input.read_string()?,
            });
        }

        for _ in 0..input.read_count()? {
            let skin = input.read_name("skin")?;
            builder.skin_mut(&skin);
            for _ in 0..input.read_count()? {
                let slot = input.read_index()?;
                if slot >= builder.slots.len() {
                    return Err(input.error(format!(
                        "skin `{skin}` slot {slot} out of range ({} slots)",
                        builder.slots.len()
                    )));
                }
                for _ in 0..input.read_count()? {
                    let name = input
                        .read_string_ref(&strings)?
                        .ok_or_else(|| input.error("attachment without name"))?;
                    match read_attachment(&mut input, &strings, name, scale)? {
                        ReadAttachment::Ready(attachment) => {
                            builder.skin_mut(&skin).set_attachment(slot, name, attachment)
                        }
                        ReadAttachment::Linked(mesh) => builder.add_linked_mesh(&skin, slot, mesh),
                    }
                }
            }
        }

        let mut animations = Vec::new();
        for _ in 0..input.read_count()? {
            animations.push(read_animation(&mut input, &strings, &builder.events, scale)?);
        }
        builder.animations = animations;

        if input.remaining() > 0 {
            log::debug!("{} trailing bytes after skeleton binary", input.remaining());
        }
        builder.build()
    }
}
