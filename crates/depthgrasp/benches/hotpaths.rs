use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::Rgba;
use ndarray::{Array4, ArrayD};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use depthgrasp::{
    Candidate, DepthImageBuffer, ModelSpec, MultiViewSampler, OrthographicImage, Pose, Refiner, RefineConfig,
    SamplerConfig, SelectionMethod, Timings, WorkspaceBoundary,
};

/// Bumpy table: 0.5 m background with a few raised blobs.
fn scene(w: u32, h: u32, pixel_size: f64) -> OrthographicImage {
    let mut img = OrthographicImage::new(DepthImageBuffer::new(w, h), pixel_size, 0.2, 0.6).unwrap();
    let blobs = [(0.02, -0.03, 0.41), (-0.05, 0.04, 0.44), (0.06, 0.05, 0.38)];
    for row in 0..h {
        for col in 0..w {
            let [x, y] = img.unproject([col as f64 + 0.5, row as f64 + 0.5]);
            let depth = blobs
                .iter()
                .filter(|(bx, by, _)| (x - bx).hypot(y - by) < 0.025)
                .map(|&(_, _, d)| d)
                .fold(0.5, f64::min);
            let v = img.value_from_depth(depth) as u16;
            img.mat_mut().put_pixel(col, row, Rgba([v; 4]));
        }
    }
    img
}

fn random_reward(shape: [usize; 4], seed: u64) -> ArrayD<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array4::from_shape_fn((shape[0], shape[1], shape[2], shape[3]), |_| rng.gen::<f32>()).into_dyn()
}

fn bench_selection(c: &mut Criterion) {
    let reward = random_reward([20, 40, 40, 4], 1);
    let mut rng = StdRng::seed_from_u64(2);

    for method in [
        SelectionMethod::Max,
        SelectionMethod::Top { n: 5 },
        SelectionMethod::PowerProb { power: 4.0 },
        SelectionMethod::Random,
    ] {
        c.bench_function(&format!("select_{method}_20x40x40x4"), |b| {
            b.iter(|| black_box(method.pick(black_box(&reward), &mut rng)))
        });
    }
}

fn bench_sampling(c: &mut Criterion) {
    let img = scene(320, 240, 1000.0);
    let model = ModelSpec::default();
    let sampler = MultiViewSampler::new(SamplerConfig::default(), &model).unwrap();
    let bin = WorkspaceBoundary::from_center_size([0.0, 0.0, 0.0], [0.2, 0.28, 0.0]);

    c.bench_function("views_20_320x240", |b| {
        b.iter(|| black_box(sampler.sample(black_box(&img), None).unwrap()))
    });
    c.bench_function("views_20_320x240_boundary", |b| {
        b.iter(|| black_box(sampler.sample(black_box(&img), Some(&bin)).unwrap()))
    });
}

fn bench_refine(c: &mut Criterion) {
    let img = scene(320, 240, 1000.0);
    let candidate = Candidate {
        pose: Pose::new(0.02, -0.03, f64::NAN, 0.4, 0.0, 0.0),
        stroke_index: 1,
        stroke: 0.05,
        estimated_reward: 1.0,
        index: [0; 4],
        model_action: None,
        method: "Max".to_string(),
        timings: Timings::default(),
    };
    let planar = Refiner::default();
    let lateral = Refiner::new(RefineConfig {
        lateral: true,
        ..RefineConfig::default()
    });

    c.bench_function("refine_planar", |b| {
        b.iter(|| black_box(planar.refine(black_box(&img), candidate.clone())))
    });
    c.bench_function("refine_lateral", |b| {
        b.iter(|| black_box(lateral.refine(black_box(&img), candidate.clone())))
    });
}

criterion_group!(hotpaths, bench_selection, bench_sampling, bench_refine);
criterion_main!(hotpaths);
