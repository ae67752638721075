use crate::{
    Atlas, Attachment, BlendMode, BoneData, BoxError, ClippingAttachment, Color, Convention,
    DrawList, ErrorKind, MeshAttachment, MeshGeometry, MeshVertices, Physics, RegionAttachment,
    RenderConfig, Skeleton, SkeletonData, SkeletonDataBuilder, SkeletonRenderer, SlotData,
    TextureCallbacks, TextureLoader,
};
use std::sync::Arc;

const PAGES: &str = r#"
a.png
size: 256,256

q1
  bounds: 0, 0, 100, 100
q2
  bounds: 100, 0, 100, 100

b.png
size: 128,128

q3
  bounds: 0, 0, 100, 100
"#;

const PMA_PAGE: &str = "p.png\nsize: 128,128\npma: true\n\nq1\n  bounds: 0, 0, 100, 100\n";

fn assert_point(actual: [f32; 2], expected: [f32; 2]) {
    let diff = (actual[0] - expected[0]).abs().max((actual[1] - expected[1]).abs());
    assert!(diff <= 1.0e-4, "expected {expected:?}, got {actual:?}");
}

fn atlas(text: &str) -> Atlas<impl TextureLoader<Texture = String>> {
    Atlas::load(
        text,
        "",
        TextureCallbacks::new(
            |path: &str| -> Result<String, BoxError> { Ok(path.to_string()) },
            |_: String| {},
        ),
    )
    .unwrap()
}

/// One root bone and one slot per entry, each showing a 100x100 region named after its atlas
/// region.
fn rig(slots: &[(&str, BlendMode)]) -> SkeletonDataBuilder {
    let mut builder = SkeletonDataBuilder::new();
    builder.add_bone(BoneData::new("root", None));
    for (i, &(region, blend)) in slots.iter().enumerate() {
        let mut slot = SlotData::new(format!("s{i}"), 0);
        slot.blend = blend;
        slot.attachment = Some(region.to_string());
        let slot = builder.add_slot(slot);
        builder.skin_mut("default").set_attachment(
            slot,
            region,
            Attachment::Region(RegionAttachment::new(region, 100.0, 100.0)),
        );
    }
    builder
}

fn posed(data: Arc<SkeletonData>) -> Skeleton {
    let mut skeleton = Skeleton::with_convention(data, Convention::YUp);
    skeleton.update_world_transform(Physics::None);
    skeleton
}

fn triangle_area(positions: &[[f32; 2]], indices: &[u16]) -> f32 {
    indices
        .chunks_exact(3)
        .map(|t| {
            let [a, b, c] = [t[0], t[1], t[2]].map(|i| positions[usize::from(i)]);
            0.5 * ((b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0])).abs()
        })
        .sum()
}

#[test]
fn single_quad_produces_one_batch_of_four_vertices() {
    let atlas = atlas(PAGES);
    let skeleton = posed(rig(&[("q1", BlendMode::Normal)]).build().unwrap());
    let mut renderer = SkeletonRenderer::default();
    let mut out = DrawList::new();
    renderer.draw(&skeleton, &atlas, &mut out).unwrap();

    assert_eq!(out.batches.len(), 1);
    let batch = &out.batches[0];
    assert_eq!(batch.texture, "a.png");
    assert_eq!(batch.vertex_count(), 4);
    assert_eq!(batch.index_count(), 6);

    let (vertices, indices) = out.batch_geometry(batch);
    assert_eq!(indices, [0, 1, 2, 2, 3, 0]);
    let expected = [[50.0, -50.0], [-50.0, -50.0], [-50.0, 50.0], [50.0, 50.0]];
    for (vertex, position) in vertices.iter().zip(expected) {
        assert_point(vertex.position, position);
        assert_eq!(vertex.color, u32::MAX);
    }
    let s = 100.0 / 256.0;
    assert_point(vertices[0].uv, [s, s]);
    assert_point(vertices[2].uv, [0.0, 0.0]);
}

#[test]
fn page_change_starts_a_new_batch() {
    let atlas = atlas(PAGES);
    let skeleton = posed(
        rig(&[
            ("q1", BlendMode::Normal),
            ("q2", BlendMode::Normal),
            ("q3", BlendMode::Normal),
        ])
        .build()
        .unwrap(),
    );
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();

    assert_eq!(out.batches.len(), 2);
    assert_eq!(out.batches[0].texture, "a.png");
    assert_eq!(out.batches[0].vertex_count(), 8);
    assert_eq!(out.batches[0].index_count(), 12);
    assert_eq!(out.batches[1].texture, "b.png");
    assert_eq!(out.batches[1].vertex_count(), 4);

    // Second quad of the first batch is offset by the first quad's vertices.
    let (_, first) = out.batch_geometry(&out.batches[0]);
    assert_eq!(&first[6..], [4, 5, 6, 6, 7, 4]);
    // Indices are relative to each batch's first vertex.
    let (_, second) = out.batch_geometry(&out.batches[1]);
    assert_eq!(second, [0, 1, 2, 2, 3, 0]);
}

#[test]
fn blend_change_splits_batches() {
    let atlas = atlas(PAGES);
    let skeleton = posed(
        rig(&[
            ("q1", BlendMode::Normal),
            ("q2", BlendMode::Additive),
            ("q1", BlendMode::Normal),
        ])
        .build()
        .unwrap(),
    );
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();

    let blends: Vec<_> = out.batches.iter().map(|b| b.blend).collect();
    assert_eq!(
        blends,
        [BlendMode::Normal, BlendMode::Additive, BlendMode::Normal]
    );
}

#[test]
fn vertex_ceiling_splits_batches() {
    let atlas = atlas(PAGES);
    let skeleton = posed(
        rig(&[("q1", BlendMode::Normal), ("q2", BlendMode::Normal)])
            .build()
            .unwrap(),
    );
    let mut out = DrawList::new();

    let mut renderer = SkeletonRenderer::new(RenderConfig {
        max_vertices_per_batch: 6,
        ..RenderConfig::default()
    });
    renderer.draw(&skeleton, &atlas, &mut out).unwrap();
    assert_eq!(out.batches.len(), 2);

    renderer.set_config(RenderConfig {
        max_vertices_per_batch: 8,
        ..RenderConfig::default()
    });
    renderer.draw(&skeleton, &atlas, &mut out).unwrap();
    assert_eq!(out.batches.len(), 1);

    // A ceiling below a single quad still emits each quad whole.
    renderer.set_config(RenderConfig {
        max_vertices_per_batch: 0,
        ..RenderConfig::default()
    });
    renderer.draw(&skeleton, &atlas, &mut out).unwrap();
    assert_eq!(out.batches.len(), 2);
    assert!(out.batches.iter().all(|b| b.vertex_count() == 4));
}

#[test]
fn stale_skeleton_cannot_be_drawn() {
    let atlas = atlas(PAGES);
    let data = rig(&[("q1", BlendMode::Normal)]).build().unwrap();
    let mut out = DrawList::new();
    let mut renderer = SkeletonRenderer::default();

    let fresh = Skeleton::new(Arc::clone(&data));
    let err = renderer.draw(&fresh, &atlas, &mut out).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StateMisuse);

    let mut moved = posed(data);
    moved.set_position(5.0, 0.0);
    assert!(renderer.draw(&moved, &atlas, &mut out).is_err());
}

#[test]
fn skeleton_transform_moves_vertices() {
    let atlas = atlas(PAGES);
    let data = rig(&[("q1", BlendMode::Normal)]).build().unwrap();
    let mut skeleton = Skeleton::with_convention(data, Convention::YDown);
    skeleton.set_position(200.0, 100.0);
    skeleton.update_world_transform(Physics::None);

    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();
    // Y-down mirrors the quad vertically around the skeleton position.
    assert_point(out.vertices[0].position, [250.0, 150.0]);
    assert_point(out.vertices[2].position, [150.0, 50.0]);
}

#[test]
fn premultiplied_pages_premultiply_tint() {
    let data = rig(&[("q1", BlendMode::Normal)]).build().unwrap();
    let mut skeleton = posed(data);
    skeleton.slot_mut(0).unwrap().color = Color::new(1.0, 1.0, 1.0, 0.5);
    let mut out_straight = DrawList::new();
    let mut out_pma = DrawList::new();
    let straight = atlas(PAGES);
    let pma = atlas(PMA_PAGE);
    let mut renderer = SkeletonRenderer::default();

    renderer.draw(&skeleton, &straight, &mut out_straight).unwrap();
    let color = out_straight.vertices[0].color;
    assert_eq!((color & 0xff, color >> 24), (255, 128));
    assert!(!out_straight.batches[0].premultiplied_alpha);

    renderer.draw(&skeleton, &pma, &mut out_pma).unwrap();
    let color = out_pma.vertices[0].color;
    assert_eq!((color & 0xff, color >> 24), (128, 128));
    assert!(out_pma.batches[0].premultiplied_alpha);
}

#[test]
fn dark_tint_is_packed_per_alpha_mode() {
    let mut builder = rig(&[("q1", BlendMode::Normal)]);
    builder.slots[0].color = Color::new(1.0, 1.0, 1.0, 0.5);
    builder.slots[0].dark_color = Some(Color::new(0.5, 0.25, 0.0, 1.0));
    let skeleton = posed(builder.build().unwrap());
    let mut renderer = SkeletonRenderer::default();
    let channels = |c: u32| (c & 0xff, (c >> 8) & 0xff, c >> 24);

    let straight = atlas(PAGES);
    let mut out = DrawList::new();
    renderer.draw(&skeleton, &straight, &mut out).unwrap();
    assert!(out.vertices.iter().all(|v| channels(v.dark_color) == (128, 64, 0)));

    let pma = atlas(PMA_PAGE);
    let mut out = DrawList::new();
    renderer.draw(&skeleton, &pma, &mut out).unwrap();
    assert!(out.vertices.iter().all(|v| channels(v.dark_color) == (64, 32, 255)));
}

#[test]
fn single_color_slots_get_opaque_black_dark_tint() {
    let atlas = atlas(PAGES);
    let skeleton = posed(rig(&[("q1", BlendMode::Normal)]).build().unwrap());
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();
    assert!(out.vertices.iter().all(|v| v.dark_color == 0xff00_0000));
}

#[test]
fn invisible_and_unresolved_attachments_are_skipped() {
    let atlas = atlas(PAGES);
    let mut builder = rig(&[("q1", BlendMode::Normal), ("missing", BlendMode::Normal)]);
    builder.slots[0].color.a = 0.0;
    let skeleton = posed(builder.build().unwrap());

    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();
    assert!(out.is_empty());
    assert!(out.vertices.is_empty());
}

fn with_mesh_and_clip(end_slot: Option<usize>) -> Skeleton {
    let mut builder = rig(&[("q1", BlendMode::Normal), ("q2", BlendMode::Normal)]);
    let mesh_slot = builder.add_slot(SlotData {
        attachment: Some("fan".to_string()),
        ..SlotData::new("mesh", 0)
    });
    builder.skin_mut("default").set_attachment(
        mesh_slot,
        "fan",
        Attachment::Mesh(MeshAttachment {
            name: "fan".to_string(),
            path: "q1".to_string(),
            color: Color::WHITE,
            geometry: Arc::new(MeshGeometry {
                vertices: MeshVertices::Unweighted(vec![[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]]),
                uvs: vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0]],
                triangles: vec![0, 1, 2],
                hull_length: 3,
            }),
        }),
    );

    let clip_slot = builder.add_slot(SlotData {
        attachment: Some("window".to_string()),
        ..SlotData::new("clip", 0)
    });
    builder.skin_mut("default").set_attachment(
        clip_slot,
        "window",
        Attachment::Clipping(ClippingAttachment {
            name: "window".to_string(),
            end_slot,
            vertices: MeshVertices::Unweighted(vec![
                [0.0, -60.0],
                [60.0, -60.0],
                [60.0, 60.0],
                [0.0, 60.0],
            ]),
        }),
    );

    let mut skeleton = posed(builder.build().unwrap());
    // Clip first, then q1, q2 and the mesh.
    skeleton.set_draw_order(vec![clip_slot, 0, 1, mesh_slot]).unwrap();
    skeleton
}

#[test]
fn clipping_trims_geometry_until_end_slot() {
    let atlas = atlas(PAGES);
    let skeleton = with_mesh_and_clip(Some(0));
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();
    assert_eq!(out.batches.len(), 1);

    // q1 is clipped to its right half, q2 and the mesh come after the end slot.
    let positions: Vec<_> = out.vertices.iter().map(|v| v.position).collect();
    let clipped = positions.len() - 4 - 3;
    assert!(positions[..clipped].iter().all(|p| p[0] >= -1.0e-4));
    let area = triangle_area(&positions, &out.indices);
    assert!((area - (5000.0 + 10000.0 + 50.0)).abs() < 1.0e-2, "area {area}");
}

#[test]
fn clipping_without_end_slot_covers_the_rest() {
    let atlas = atlas(PAGES);
    let skeleton = with_mesh_and_clip(None);
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();

    assert!(out.vertices.iter().all(|v| v.position[0] >= -1.0e-4));
    let positions: Vec<_> = out.vertices.iter().map(|v| v.position).collect();
    let area = triangle_area(&positions, &out.indices);
    assert!((area - (5000.0 + 5000.0 + 50.0)).abs() < 1.0e-2, "area {area}");
}

#[test]
fn clipping_that_ends_on_its_own_slot_clips_nothing() {
    let atlas = atlas(PAGES);
    // Slots are q1, q2, mesh, then the clip itself.
    let skeleton = with_mesh_and_clip(Some(3));
    let mut out = DrawList::new();
    SkeletonRenderer::default()
        .draw(&skeleton, &atlas, &mut out)
        .unwrap();

    assert_eq!(out.vertices.len(), 4 + 4 + 3);
    let positions: Vec<_> = out.vertices.iter().map(|v| v.position).collect();
    let area = triangle_area(&positions, &out.indices);
    assert!((area - (10000.0 + 10000.0 + 50.0)).abs() < 1.0e-2, "area {area}");
}

#[test]
fn lite_mode_draws_regions_only() {
    let atlas = atlas(PAGES);
    let skeleton = with_mesh_and_clip(None);
    let mut renderer = SkeletonRenderer::new(RenderConfig {
        lite: true,
        ..RenderConfig::default()
    });
    let mut out = DrawList::new();
    renderer.draw(&skeleton, &atlas, &mut out).unwrap();

    // Two unclipped quads, no mesh.
    assert_eq!(out.vertices.len(), 8);
    assert_eq!(out.indices.len(), 12);
    assert!(out.vertices.iter().any(|v| v.position[0] < -49.0));
}
