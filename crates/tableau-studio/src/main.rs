use tableau_engine::coords::{ColorRgba, Vec2};
use tableau_engine::core::{App, AppControl, FrameCtx};
use tableau_engine::device::GpuInit;
use tableau_engine::logging::{init_logging, LoggingConfig};
use tableau_engine::render::{BlendMode, DrawLayer, RenderProgram, TextureDesc};
use tableau_engine::scene::{Drawable, Level, NodeId, NodeKind, Quad, Sprite};
use tableau_engine::window::{Runtime, RuntimeConfig};

const CHECKER_SIZE: u32 = 16;

/// 16x16 two-tone checkerboard, 4px cells.
fn checker_rgba() -> Vec<u8> {
    let mut out = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let light = ((x / 4) + (y / 4)) % 2 == 0;
            let v = if light { 235 } else { 120 };
            out.extend_from_slice(&[v, v, v, 255]);
        }
    }
    out
}

fn center_origin(level: &mut Level, id: NodeId) {
    if let Err(err) = level.set_origin(id, Vec2::splat(0.5)) {
        log::warn!("set_origin on {id:?} failed: {err}");
    }
}

/// Sun with an orbiting planet and moon; the moon is detached and respawned
/// every few seconds to exercise deferred destruction and batch cleanup.
#[derive(Default)]
struct SolarSystem {
    sun: Option<NodeId>,
    orbit: Option<NodeId>,
    planet: Option<NodeId>,
    moon: Option<NodeId>,
    moon_program: Option<RenderProgram>,
    next_respawn: f32,
}

impl SolarSystem {
    fn spawn_moon(&mut self, ctx: &mut FrameCtx<'_>) {
        let (Some(planet), Some(program)) = (self.planet, self.moon_program) else {
            return;
        };
        let drawable = Drawable::new(
            Sprite::new(Vec2::splat(24.0)).with_tint(ColorRgba::from_rgba_u8(200, 220, 255, 255)),
            program,
        );
        match ctx.level.spawn_child(planet, drawable) {
            Ok(moon) => {
                center_origin(ctx.level, moon);
                ctx.level.set_position(moon, Vec2::new(70.0, 0.0));
                self.moon = Some(moon);
            }
            Err(err) => log::warn!("moon spawn failed: {err}"),
        }
    }
}

impl App for SolarSystem {
    fn on_start(&mut self, ctx: &mut FrameCtx<'_>) {
        let checker = checker_rgba();
        let texture = ctx.load_texture(&TextureDesc::new("checker", CHECKER_SIZE, CHECKER_SIZE, &checker));
        let base = ctx.sprite_program(texture);

        let center = ctx.level.view(ctx.level.default_view()).map(|v| v.size * 0.5).unwrap_or(Vec2::ZERO);
        let root = ctx.level.root();

        // Backdrop on the lowest layer, untextured.
        let backdrop = Drawable::new(
            Quad::new(Vec2::new(4096.0, 4096.0), ColorRgba::from_rgba_u8(12, 14, 30, 255)),
            ctx.sprite_program(None).with_layer(DrawLayer(-10)),
        );
        if let Ok(bg) = ctx.level.spawn_child(root, backdrop) {
            center_origin(ctx.level, bg);
            ctx.level.set_position(bg, center);
        }

        let sun = ctx.level.spawn(Drawable::new(
            Sprite::new(Vec2::splat(120.0)).with_tint(ColorRgba::from_rgba_u8(255, 200, 80, 255)),
            base.with_layer(DrawLayer(1)),
        ));
        center_origin(ctx.level, sun);
        ctx.level.set_position(sun, center);

        // Additive glow drawn above the sun.
        let glow = Drawable::new(
            Quad::new(Vec2::splat(180.0), ColorRgba::new(1.0, 0.6, 0.2, 0.25)),
            ctx.sprite_program(None).with_blend_mode(BlendMode::Additive).with_layer(DrawLayer(2)),
        );
        if let Ok(glow) = ctx.level.spawn_child(sun, glow) {
            center_origin(ctx.level, glow);
            ctx.level.set_position(glow, Vec2::splat(60.0));
        }

        // Invisible pivot so the planet's orbit is independent of the sun's spin.
        let orbit = ctx.level.spawn(NodeKind::Plain);
        ctx.level.set_position(orbit, center);

        let planet = Drawable::new(
            Sprite::new(Vec2::splat(48.0)).with_tint(ColorRgba::from_rgba_u8(90, 160, 255, 255)),
            base,
        );
        match ctx.level.spawn_child(orbit, planet) {
            Ok(planet) => {
                center_origin(ctx.level, planet);
                ctx.level.set_position(planet, Vec2::new(220.0, 0.0));
                self.planet = Some(planet);
            }
            Err(err) => log::warn!("planet spawn failed: {err}"),
        }

        self.sun = Some(sun);
        self.orbit = Some(orbit);
        self.moon_program = Some(base.with_layer(DrawLayer(3)));
        self.spawn_moon(ctx);
        self.next_respawn = 4.0;

        ctx.runtime.set_title("tableau · solar system");
    }

    fn on_tick(&mut self, ctx: &mut FrameCtx<'_>) -> AppControl {
        let dt = ctx.time.dt;

        if let Some(sun) = self.sun {
            ctx.level.rotate(sun, 20.0 * dt);
        }
        if let Some(orbit) = self.orbit {
            ctx.level.rotate(orbit, 35.0 * dt);
        }
        if let Some(planet) = self.planet {
            ctx.level.rotate(planet, -90.0 * dt);
        }

        if ctx.time.elapsed >= self.next_respawn {
            self.next_respawn += 4.0;
            if let Some(moon) = self.moon.take() {
                ctx.level.destroy(moon);
            } else {
                self.spawn_moon(ctx);
            }
        }

        AppControl::Continue
    }
}

fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::default());

    let config = RuntimeConfig {
        title: "tableau".to_string(),
        ..RuntimeConfig::default()
    };
    Runtime::run(config, GpuInit::default(), SolarSystem::default())
}
