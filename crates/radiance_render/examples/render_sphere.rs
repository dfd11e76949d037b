//! Volume render a few analytic spheres.
//!
//! Renders color and depth maps with the coarse/fine pipeline and saves
//! them as PNG. Run with `RUST_LOG=info` to see timing.

use anyhow::Result;
use radiance_render::{
    CameraPose, CameraView, Color, FieldError, FieldPass, FieldSamples, FrameRenderer, Interval,
    Intrinsics, RadianceField, RenderConfig, SphereField, Vec3,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// Union of spheres; the first sphere containing a point answers for it.
struct SphereScene {
    spheres: Vec<SphereField>,
}

impl RadianceField for SphereScene {
    fn query(
        &self,
        points: &[Vec3],
        view_dirs: Option<&[Vec3]>,
        _pass: FieldPass,
    ) -> std::result::Result<FieldSamples, FieldError> {
        let mut samples = FieldSamples::with_capacity(points.len());
        for (i, &p) in points.iter().enumerate() {
            let hit = self
                .spheres
                .iter()
                .find(|s| (p - s.center).length_squared() <= s.radius * s.radius);

            match hit {
                Some(sphere) => {
                    // Cheap view-dependent tint: brighter where we look at the normal
                    let shade = view_dirs
                        .map(|dirs| {
                            let normal = (p - sphere.center).normalize_or_zero();
                            0.6 + 0.4 * (-dirs[i]).dot(normal).max(0.0)
                        })
                        .unwrap_or(1.0);
                    samples.push(sphere.color * shade, sphere.density);
                }
                None => samples.push(Color::ZERO, 0.0),
            }
        }
        Ok(samples)
    }
}

fn main() -> Result<()> {
    env_logger::init();

    println!("Radiance Volume Renderer - Sphere Example");
    println!("=========================================");

    let scene = SphereScene {
        spheres: vec![
            SphereField::new(Vec3::new(0.0, 0.0, 0.0), 0.8, Color::new(0.8, 0.3, 0.2), 0.4),
            SphereField::new(Vec3::new(-1.2, 0.2, -0.6), 0.5, Color::new(0.2, 0.6, 0.9), 0.6),
            SphereField::new(Vec3::new(1.1, -0.3, 0.5), 0.4, Color::new(0.3, 0.8, 0.3), 0.2),
        ],
    };

    let (width, height) = (200, 150);
    let view = CameraView::new(
        width,
        height,
        Intrinsics::from_focal(180.0, width, height),
        CameraPose::look_at(Vec3::new(0.0, 0.5, 4.0), Vec3::ZERO, Vec3::Y),
    );

    let config = RenderConfig::default()
        .with_samples(64, 64)
        .with_white_background(true)
        .with_chunk_size(512);
    let renderer = FrameRenderer::new(config)?;

    println!("Rendering {}x{}...", width, height);
    let start = std::time::Instant::now();
    let mut rng = StdRng::seed_from_u64(0);
    let frame = renderer.render(&view, &scene, &mut rng)?;
    println!("Rendered in {:?}", start.elapsed());

    frame.to_image().save("spheres_rgb.png")?;
    frame
        .depth_image(Interval::new(view.near, view.far))
        .save("spheres_depth.png")?;
    println!("Saved spheres_rgb.png and spheres_depth.png");

    Ok(())
}
