//! Headless frames: scene → batches → recorded backend commands.

use approx::assert_relative_eq;

use tableau_engine::coords::{ColorRgba, Vec2};
use tableau_engine::render::{
    BackendCommand, BlendMode, DeviceConfig, DrawLayer, GpuBackend, GraphicsDevice, RecordingBackend,
    RenderTarget, TextureDesc,
};
use tableau_engine::scene::{Drawable, Level, NodeKind, Quad};

fn setup() -> (RecordingBackend, GraphicsDevice, Level) {
    let mut backend = RecordingBackend::new();
    let device = GraphicsDevice::new(&mut backend, DeviceConfig::default()).unwrap();
    (backend, device, Level::new(Vec2::new(200.0, 100.0)))
}

fn quad(device: &GraphicsDevice, layer: i32) -> Drawable {
    Drawable::new(
        Quad::new(Vec2::splat(10.0), ColorRgba::WHITE),
        device.sprite_program(None).with_layer(DrawLayer(layer)),
    )
}

#[test]
fn child_geometry_follows_rotated_parent() {
    let (mut backend, mut device, mut level) = setup();
    let root = level.root();

    let pivot = level.spawn(NodeKind::Plain);
    level.set_position(pivot, Vec2::new(100.0, 50.0));
    level.set_rotation(pivot, 90.0);
    let child = level.spawn_child(pivot, quad(&device, 0)).unwrap();
    level.set_position(child, Vec2::new(10.0, 0.0));
    assert_eq!(level.parent(pivot), Some(root));

    device.draw_batches(&mut level, &mut backend);

    let draws = backend.draws_to(RenderTarget::FrameBuffer);
    assert_eq!(draws.len(), 1);
    let (_, projection, vertices) = draws[0];
    assert_eq!(vertices.len(), 4);

    // Local (0,0) → parent space (10,0) → rotated 90° clockwise → (0,10).
    assert_relative_eq!(vertices[0].position[0], 100.0, epsilon = 1e-4);
    assert_relative_eq!(vertices[0].position[1], 60.0, epsilon = 1e-4);

    // The default view spans (0,0)..(200,100): its center lands on clip (0,0).
    let center = projection.transform_point(Vec2::new(100.0, 50.0));
    assert_relative_eq!(center.x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(center.y, 0.0, epsilon = 1e-5);
}

#[test]
fn reparenting_keeps_submitted_geometry() {
    let (mut backend, mut device, mut level) = setup();

    let a = level.spawn(NodeKind::Plain);
    level.set_position(a, Vec2::new(30.0, 20.0));
    level.set_rotation(a, 45.0);
    level.set_scale(a, Vec2::new(2.0, 2.0));
    let b = level.spawn(NodeKind::Plain);
    level.set_position(b, Vec2::new(-5.0, 70.0));
    level.set_rotation(b, -30.0);

    let node = level.spawn_child(a, quad(&device, 0)).unwrap();
    level.set_position(node, Vec2::new(4.0, 8.0));

    device.draw_batches(&mut level, &mut backend);
    let before: Vec<[f32; 2]> = backend.draws_to(RenderTarget::FrameBuffer)[0]
        .2
        .iter()
        .map(|v| v.position)
        .collect();

    level.set_parent(node, b).unwrap();
    backend.take_commands();
    device.draw_batches(&mut level, &mut backend);
    let after = backend.draws_to(RenderTarget::FrameBuffer)[0].2.to_vec();

    for (p, v) in before.iter().zip(&after) {
        assert_relative_eq!(p[0], v.position[0], epsilon = 1e-3);
        assert_relative_eq!(p[1], v.position[1], epsilon = 1e-3);
    }
}

#[test]
fn layers_flush_in_order_and_composite_is_last() {
    let (mut backend, mut device, mut level) = setup();

    // Registration order differs from layer order.
    for layer in [5, -1, 2] {
        level.spawn(quad(&device, layer));
    }

    let stats = device.draw_batches(&mut level, &mut backend);
    assert_eq!(stats.batches, 3);
    assert_eq!(stats.draw_calls, 4);

    let layers: Vec<i32> = backend
        .draws_to(RenderTarget::FrameBuffer)
        .iter()
        .map(|(program, _, _)| program.layer().0)
        .collect();
    assert_eq!(layers, vec![-1, 2, 5]);

    assert!(matches!(
        backend.commands().first(),
        Some(BackendCommand::Clear { target: RenderTarget::FrameBuffer, .. })
    ));
    match backend.commands().last() {
        Some(BackendCommand::Draw { target, program, vertices, .. }) => {
            assert_eq!(*target, RenderTarget::Screen);
            assert_eq!(program.blend_mode(), BlendMode::None);
            assert_eq!(program.texture(), Some(backend.frame_buffer_texture()));
            assert_eq!(vertices.len(), 4);
        }
        other => panic!("expected composite draw, got {other:?}"),
    }
}

#[test]
fn destroyed_and_moved_drawables_release_their_batches() {
    let (mut backend, mut device, mut level) = setup();

    let keep = level.spawn(quad(&device, 0));
    let doomed = level.spawn(quad(&device, 1));
    assert_eq!(device.draw_batches(&mut level, &mut backend).batches, 2);

    level.destroy(doomed);
    assert_eq!(level.sweep_destroyed(), 1);
    let stats = device.draw_batches(&mut level, &mut backend);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.batches_removed, 1);

    let texture = device.load_texture(&mut backend, &TextureDesc::new("t", 1, 1, &[255; 4]));
    assert!(texture.is_some());
    level.drawable_mut(keep).unwrap().set_texture(texture);
    let stats = device.draw_batches(&mut level, &mut backend);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.batches_created, 1);
    assert_eq!(device.batches()[0].program().texture(), texture);
}

#[test]
fn hidden_drawables_submit_nothing() {
    let (mut backend, mut device, mut level) = setup();

    let node = level.spawn(quad(&device, 0));
    level.drawable_mut(node).unwrap().set_visible(false);

    let stats = device.draw_batches(&mut level, &mut backend);
    assert_eq!(stats.vertices, 0);
    assert!(backend.draws_to(RenderTarget::FrameBuffer).is_empty());
    assert_eq!(backend.draws_to(RenderTarget::Screen).len(), 1);
}
