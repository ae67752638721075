use crate::{
    Animation, Attachment, BoneData, BoneTimeline, ClippingAttachment, Error, ErrorKind, Keyframe,
    LinkedMeshRef, MeshAttachment, MeshGeometry, MeshVertices, PhysicsConstraintData,
    SkeletonDataBuilder, SlotData,
};
use std::sync::Arc;

fn chain(parents: &[Option<usize>]) -> SkeletonDataBuilder {
    let mut builder = SkeletonDataBuilder::new();
    for (i, parent) in parents.iter().enumerate() {
        builder.add_bone(BoneData::new(format!("b{i}"), *parent));
    }
    builder
}

fn triangle_mesh(name: &str) -> Attachment {
    Attachment::Mesh(MeshAttachment {
        name: name.to_string(),
        path: name.to_string(),
        color: Default::default(),
        geometry: Arc::new(MeshGeometry {
            vertices: MeshVertices::Unweighted(vec![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]),
            uvs: vec![[0.0, 1.0], [1.0, 1.0], [0.0, 0.0]],
            triangles: vec![0, 1, 2],
            hull_length: 3,
        }),
    })
}

#[test]
fn update_order_puts_parents_first() {
    // Children declared before their parents.
    let data = chain(&[Some(2), None, Some(1), Some(0)]).build().unwrap();
    let order = data.update_order();
    let position = |bone: usize| order.iter().position(|&b| b == bone).unwrap();

    assert_eq!(order.len(), 4);
    assert!(position(1) < position(2));
    assert!(position(2) < position(0));
    assert!(position(0) < position(3));
}

#[test]
fn hierarchy_errors() {
    let cases = [
        vec![Some(1), Some(0)],
        vec![None, Some(1)],
        vec![None, Some(7)],
        vec![],
    ];
    for parents in cases {
        let err = chain(&parents).build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidHierarchy, "{parents:?}: {err}");
    }
}

#[test]
fn cycle_error_names_a_bone_in_the_cycle() {
    let err = chain(&[None, Some(2), Some(1)]).build().unwrap_err();
    let Error::InvalidHierarchy { bone, .. } = err else {
        panic!("expected hierarchy error");
    };
    assert!(bone == "b1" || bone == "b2", "{bone}");
}

#[test]
fn duplicate_names_are_rejected() {
    let mut builder = chain(&[None]);
    builder.add_bone(BoneData::new("b0", Some(0)));
    assert!(matches!(builder.build(), Err(Error::InvalidData { .. })));
}

#[test]
fn slot_must_reference_existing_bone() {
    let mut builder = chain(&[None]);
    builder.add_slot(SlotData::new("s", 3));
    assert_eq!(builder.build().unwrap_err().kind(), ErrorKind::ResourceLoad);
}

#[test]
fn mesh_geometry_is_validated() {
    let mut builder = chain(&[None]);
    let slot = builder.add_slot(SlotData::new("s", 0));
    let Attachment::Mesh(mut mesh) = triangle_mesh("m") else {
        unreachable!();
    };
    Arc::make_mut(&mut mesh.geometry).triangles = vec![0, 1, 5];
    builder
        .skin_mut("default")
        .set_attachment(slot, "m", Attachment::Mesh(mesh));

    let err = builder.build().unwrap_err();
    assert!(err.to_string().contains("out of range"), "{err}");
}

#[test]
fn clipping_needs_a_polygon() {
    let mut builder = chain(&[None]);
    let slot = builder.add_slot(SlotData::new("s", 0));
    builder.skin_mut("default").set_attachment(
        slot,
        "clip",
        Attachment::Clipping(ClippingAttachment {
            name: "clip".to_string(),
            end_slot: None,
            vertices: MeshVertices::Unweighted(vec![[0.0, 0.0], [1.0, 0.0]]),
        }),
    );
    assert!(builder.build().is_err());
}

#[test]
fn linked_mesh_shares_parent_geometry() {
    let mut builder = chain(&[None]);
    let slot = builder.add_slot(SlotData::new("s", 0));
    builder
        .skin_mut("default")
        .set_attachment(slot, "base", triangle_mesh("base"));
    builder.skin_mut("red");
    builder.add_linked_mesh(
        "red",
        slot,
        LinkedMeshRef {
            name: "tinted".to_string(),
            path: "base-red".to_string(),
            color: Default::default(),
            parent_skin: Some("default".to_string()),
            parent: "base".to_string(),
        },
    );
    let data = builder.build().unwrap();

    let base = data.attachment(None, slot, "base").unwrap();
    let linked = data.attachment(Some("red"), slot, "tinted").unwrap();
    assert_eq!(linked.texture_path(), Some("base-red"));
    assert!(Arc::ptr_eq(
        base.mesh_geometry().unwrap(),
        linked.mesh_geometry().unwrap()
    ));
}

#[test]
fn linked_mesh_without_parent_fails() {
    let mut builder = chain(&[None]);
    let slot = builder.add_slot(SlotData::new("s", 0));
    builder.add_linked_mesh(
        "default",
        slot,
        LinkedMeshRef {
            name: "orphan".to_string(),
            path: "orphan".to_string(),
            color: Default::default(),
            parent_skin: None,
            parent: "missing".to_string(),
        },
    );
    assert!(builder.build().is_err());
}

#[test]
fn animations_are_validated_and_indexed() {
    let mut builder = chain(&[None]);
    let mut unsorted = Animation::new("unsorted", 1.0);
    unsorted.bone_timelines.push(BoneTimeline::Rotate {
        bone: 0,
        frames: vec![Keyframe::new(0.5, 0.0), Keyframe::new(0.25, 1.0)],
    });
    builder.add_animation(unsorted);
    assert!(builder.build().is_err());

    let mut builder = chain(&[None]);
    let mut stray = Animation::new("stray", 1.0);
    stray.bone_timelines.push(BoneTimeline::Scale {
        bone: 4,
        frames: vec![Keyframe::new(0.0, [1.0, 1.0])],
    });
    builder.add_animation(stray);
    assert!(builder.build().is_err());

    let mut builder = chain(&[None]);
    let mut ok = Animation::new("ok", 1.0);
    ok.bone_timelines.push(BoneTimeline::Shear {
        bone: 0,
        frames: vec![Keyframe::new(0.0, [1.0, 0.0])],
    });
    builder.add_animation(ok);
    let data = builder.build().unwrap();
    let ok = data.animation("ok").unwrap();
    assert!(ok.keys(crate::Property::Shear(0)));
    assert!(!ok.keys(crate::Property::Rotate(0)));
    assert_eq!(data.find_animation("ok"), Some(0));
}

#[test]
fn physics_constraint_is_validated() {
    let mut builder = chain(&[None]);
    let mut constraint = PhysicsConstraintData::new("p", 0);
    constraint.step = 0.0;
    builder.physics_constraints.push(constraint);
    assert!(builder.build().is_err());
}
