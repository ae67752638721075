use crate::atlas::{Atlas, AtlasPage, AtlasRegion, TextureLoader};
use crate::geometry::{ClippedMesh, SkeletonClipper};
use crate::{
    Attachment, BlendMode, Bone, ClippingAttachment, Color, Error, MeshGeometry, MeshVertices,
    RegionAttachment, Skeleton,
};
use std::ops::Range;

/// Default vertex ceiling per batch, a multiple of 4 and 6 below the 16-bit index limit.
pub const DEFAULT_MAX_VERTICES_PER_BATCH: usize = 10920;

const QUAD_TRIANGLES: [u16; 6] = [0, 1, 2, 2, 3, 0];
const MAX_INDEXABLE_VERTICES: usize = u16::MAX as usize + 1;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RenderConfig {
    /// A batch is closed once adding an attachment would exceed this many vertices.
    pub max_vertices_per_batch: usize,
    /// Emit region attachments only. Meshes and clipping are skipped.
    pub lite: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_vertices_per_batch: DEFAULT_MAX_VERTICES_PER_BATCH,
            lite: false,
        }
    }
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
#[cfg_attr(feature = "bytemuck", derive(bytemuck::Pod, bytemuck::Zeroable))]
pub struct Vertex {
    pub position: [f32; 2],
    pub uv: [f32; 2],
    /// RGBA8, red in the lowest byte. Premultiplied when the batch is.
    pub color: u32,
    /// Two-color tint, packed like `color`. Opaque black for single-color slots. For
    /// premultiplied batches the rgb is scaled by the light alpha and alpha is 255, otherwise
    /// alpha is 0.
    pub dark_color: u32,
}

/// A run of geometry sharing one texture and blend state.
#[derive(Debug)]
pub struct Batch<'a, T> {
    pub texture: &'a T,
    pub page: usize,
    pub blend: BlendMode,
    pub premultiplied_alpha: bool,
    /// Range into [`DrawList::vertices`].
    pub vertices: Range<usize>,
    /// Range into [`DrawList::indices`]. Indices are relative to `vertices.start`.
    pub indices: Range<usize>,
}

impl<T> Batch<'_, T> {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }
}

#[derive(Debug)]
pub struct DrawList<'a, T> {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
    pub batches: Vec<Batch<'a, T>>,
}

impl<T> Default for DrawList<'_, T> {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            indices: Vec::new(),
            batches: Vec::new(),
        }
    }
}

impl<'a, T> DrawList<'a, T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.batches.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Vertex and index slices for one batch.
    pub fn batch_geometry(&self, batch: &Batch<'a, T>) -> (&[Vertex], &[u16]) {
        (
            &self.vertices[batch.vertices.clone()],
            &self.indices[batch.indices.clone()],
        )
    }
}

/// Turns a posed skeleton into textured triangle batches.
///
/// Keeps scratch buffers between calls, so one renderer per thread is the intended use.
#[derive(Debug, Default)]
pub struct SkeletonRenderer {
    config: RenderConfig,
    clipper: SkeletonClipper,
    positions: Vec<[f32; 2]>,
    uvs: Vec<[f32; 2]>,
    clipped: ClippedMesh,
}

struct Target<'a, T> {
    texture: &'a T,
    page: usize,
    blend: BlendMode,
    premultiplied_alpha: bool,
    color: u32,
    dark_color: u32,
}

impl SkeletonRenderer {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> RenderConfig {
        self.config
    }

    pub fn set_config(&mut self, config: RenderConfig) {
        self.config = config;
    }

    /// Replaces the contents of `out` with the skeleton's geometry in draw order.
    ///
    /// Fails with [`Error::StateMisuse`], leaving `out` empty, when the skeleton's world transforms
    /// are stale.
    pub fn draw<'a, L: TextureLoader>(
        &mut self,
        skeleton: &Skeleton,
        atlas: &'a Atlas<L>,
        out: &mut DrawList<'a, L::Texture>,
    ) -> Result<(), Error> {
        out.clear();
        if !skeleton.is_posed() {
            log::warn!("draw called on a skeleton with stale world transforms");
            return Err(Error::state_misuse(
                "skeleton must be posed with update_world_transform before drawing",
            ));
        }
        let mut clip_end_slot = None;

        for &slot_index in skeleton.draw_order() {
            if let Some(attachment) = skeleton.slot_attachment(slot_index) {
                if let Attachment::Clipping(clip) = attachment {
                    if !self.config.lite && self.start_clip(skeleton, slot_index, clip) {
                        clip_end_slot = clip.end_slot;
                    }
                } else {
                    self.draw_attachment(skeleton, slot_index, attachment, atlas, out);
                }
            }

            if clip_end_slot == Some(slot_index) {
                self.clipper.clip_end();
                clip_end_slot = None;
            }
        }
        self.clipper.clip_end();

        log::trace!(
            "drew {} vertices in {} batches",
            out.vertices.len(),
            out.batches.len()
        );
        Ok(())
    }

    fn start_clip(&mut self, skeleton: &Skeleton, slot_index: usize, clip: &ClippingAttachment) -> bool {
        let bone = &skeleton.bones()[skeleton.slots()[slot_index].bone];
        world_vertices(skeleton, bone, &clip.vertices, &mut self.positions);
        let started = self.clipper.clip_start(&self.positions);
        if !started {
            log::debug!("clipping attachment '{}' ignored", clip.name);
        }
        started
    }

    fn draw_attachment<'a, L: TextureLoader>(
        &mut self,
        skeleton: &Skeleton,
        slot_index: usize,
        attachment: &Attachment,
        atlas: &'a Atlas<L>,
        out: &mut DrawList<'a, L::Texture>,
    ) {
        if self.config.lite && !matches!(attachment, Attachment::Region(_)) {
            return;
        }
        let Some(path) = attachment.texture_path() else {
            return;
        };
        let slot = &skeleton.slots()[slot_index];
        let tint = skeleton.color * slot.color * attachment.color();
        if tint.a <= 0.0 {
            return;
        }
        let Some(region) = atlas.region(path) else {
            log::debug!("no atlas region '{path}' for attachment '{}'", attachment.name());
            return;
        };
        let (Some(page), Some(texture)) = (atlas.pages().get(region.page), atlas.texture(region.page))
        else {
            return;
        };
        let bone = &skeleton.bones()[slot.bone];
        let target = Target {
            texture,
            page: region.page,
            blend: slot.blend,
            premultiplied_alpha: page.pma,
            color: packed_tint(tint, page.pma),
            dark_color: packed_dark_tint(slot.dark_color, tint.clamped().a, page.pma),
        };

        let triangles: &[u16] = match attachment {
            Attachment::Region(r) => {
                self.positions.clear();
                self.positions.extend(
                    region_local_vertices(r, region)
                        .into_iter()
                        .map(|[x, y]| bone.local_to_world(x, y)),
                );
                self.uvs.clear();
                self.uvs.extend(region.quad_uvs(page));
                &QUAD_TRIANGLES
            }
            _ => {
                let Some(geometry) = attachment.mesh_geometry() else {
                    return;
                };
                self.mesh_vertices(skeleton, bone, geometry, region, page);
                &geometry.triangles
            }
        };

        let limit = self.batch_limit();
        if self.clipper.is_clipping() {
            self.clipper
                .clip_triangles(&self.positions, &self.uvs, triangles, &mut self.clipped);
            let clipped = &self.clipped;
            append(out, limit, target, &clipped.positions, &clipped.uvs, &clipped.triangles);
        } else {
            append(out, limit, target, &self.positions, &self.uvs, triangles);
        }
    }

    fn mesh_vertices(
        &mut self,
        skeleton: &Skeleton,
        bone: &Bone,
        geometry: &MeshGeometry,
        region: &AtlasRegion,
        page: &AtlasPage,
    ) {
        world_vertices(skeleton, bone, &geometry.vertices, &mut self.positions);
        self.uvs.clear();
        self.uvs
            .extend(geometry.uvs.iter().map(|&uv| region.map_uv(page, uv)));
    }

    fn batch_limit(&self) -> usize {
        self.config
            .max_vertices_per_batch
            .clamp(1, MAX_INDEXABLE_VERTICES)
    }
}

fn packed_tint(tint: Color, premultiplied_alpha: bool) -> u32 {
    let tint = tint.clamped();
    if premultiplied_alpha {
        tint.premultiplied().to_packed()
    } else {
        tint.to_packed()
    }
}

fn packed_dark_tint(dark: Option<Color>, light_alpha: f32, premultiplied_alpha: bool) -> u32 {
    let Some(dark) = dark else {
        return Color::new(0.0, 0.0, 0.0, 1.0).to_packed();
    };
    if premultiplied_alpha {
        Color::new(dark.r * light_alpha, dark.g * light_alpha, dark.b * light_alpha, 1.0).to_packed()
    } else {
        Color { a: 0.0, ..dark }.to_packed()
    }
}

fn world_vertices(skeleton: &Skeleton, bone: &Bone, vertices: &MeshVertices, out: &mut Vec<[f32; 2]>) {
    out.clear();
    match vertices {
        MeshVertices::Unweighted(points) => {
            out.extend(points.iter().map(|&[x, y]| bone.local_to_world(x, y)));
        }
        MeshVertices::Weighted(weights) => {
            let bones = skeleton.bones();
            out.extend(weights.iter().map(|influences| {
                influences.iter().fold([0.0, 0.0], |[wx, wy], w| {
                    let [x, y] = bones[w.bone].local_to_world(w.x, w.y);
                    [wx + x * w.weight, wy + y * w.weight]
                })
            }));
        }
    }
}

/// Quad corners in the slot bone's space, in BR, BL, UL, UR order.
///
/// Whitespace stripped by the packer is accounted for, so the quad covers only the packed pixels.
fn region_local_vertices(attachment: &RegionAttachment, region: &AtlasRegion) -> [[f32; 2]; 4] {
    let RegionAttachment {
        x,
        y,
        rotation,
        scale_x,
        scale_y,
        width,
        height,
        ..
    } = *attachment;

    let region_scale_x = width / region.original_width.max(1) as f32 * scale_x;
    let region_scale_y = height / region.original_height.max(1) as f32 * scale_y;
    let local_x = -width * 0.5 * scale_x + region.offset_x * region_scale_x;
    let local_y = -height * 0.5 * scale_y + region.offset_y * region_scale_y;
    let local_x2 = local_x + region.width as f32 * region_scale_x;
    let local_y2 = local_y + region.height as f32 * region_scale_y;

    let (sin, cos) = rotation.to_radians().sin_cos();
    let corner = |lx: f32, ly: f32| [lx * cos - ly * sin + x, lx * sin + ly * cos + y];

    [
        corner(local_x2, local_y),
        corner(local_x, local_y),
        corner(local_x, local_y2),
        corner(local_x2, local_y2),
    ]
}

fn append<'a, T>(
    out: &mut DrawList<'a, T>,
    limit: usize,
    target: Target<'a, T>,
    positions: &[[f32; 2]],
    uvs: &[[f32; 2]],
    triangles: &[u16],
) {
    let count = positions.len();
    if count == 0 || triangles.is_empty() {
        return;
    }
    if count > MAX_INDEXABLE_VERTICES {
        log::warn!("attachment with {count} vertices exceeds 16-bit indices, skipped");
        return;
    }

    let start = out.vertices.len();
    let joins_last = out.batches.last().is_some_and(|b| {
        b.page == target.page
            && b.blend == target.blend
            && b.premultiplied_alpha == target.premultiplied_alpha
            && b.vertices.len() + count <= limit
    });
    if !joins_last {
        let index_start = out.indices.len();
        out.batches.push(Batch {
            texture: target.texture,
            page: target.page,
            blend: target.blend,
            premultiplied_alpha: target.premultiplied_alpha,
            vertices: start..start,
            indices: index_start..index_start,
        });
    }

    out.vertices
        .extend(positions.iter().zip(uvs).map(|(&position, &uv)| Vertex {
            position,
            uv,
            color: target.color,
            dark_color: target.dark_color,
        }));

    let Some(batch) = out.batches.last_mut() else {
        return;
    };
    let base = (start - batch.vertices.start) as u16;
    out.indices.extend(triangles.iter().map(|&i| base + i));
    batch.vertices.end = out.vertices.len();
    batch.indices.end = out.indices.len();
}
