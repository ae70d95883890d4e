use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use redgreen_core::{KeyStates, PhotodiodeState, Scene, Tally};
use redgreen_render::{Overlay, RenderConfig, SceneRenderer};

fn scene() -> Scene {
    let steps: Vec<String> = (0..300)
        .map(|i| format!(r#""{i}": {{"x": {}, "y": 5.0}}"#, 1.0 + i as f32 * 0.05))
        .collect();
    let json = format!(
        r#"{{
            "worldWidth": 20, "worldHeight": 20, "radius": 0.5,
            "barriers": [
                {{"x": 0, "y": 0, "width": 20, "height": 1}},
                {{"x": 9, "y": 1, "width": 1, "height": 6}}
            ],
            "occluders": [{{"x": 6, "y": 3, "width": 4, "height": 6}}],
            "red_sensor": {{"x": 0, "y": 1, "width": 2, "height": 2}},
            "green_sensor": {{"x": 18, "y": 1, "width": 2, "height": 2}},
            "counterbalance": true,
            "step_data": {{{}}}
        }}"#,
        steps.join(",")
    );
    serde_json::from_str(&json).expect("bench scene")
}

fn harness() -> (SceneRenderer, Scene, Vec<u8>) {
    let (width, height) = (1920u32, 1080u32);
    let r = SceneRenderer::new(width, height, RenderConfig::default()).expect("renderer");
    let fb = vec![0u8; (width * height * 4) as usize];
    (r, scene(), fb)
}

pub fn bench_playback_frame(c: &mut Criterion) {
    let mut g = c.benchmark_group("render_frame");
    g.sample_size(40);

    g.bench_function("playback_frame", |b| {
        b.iter_batched(
            harness,
            |(mut r, scene, mut fb)| {
                let overlay = Overlay {
                    photodiode: PhotodiodeState::Lit,
                    keys: Some(KeyStates {
                        red: true,
                        green: false,
                    }),
                    tally: Some(Tally {
                        red: 80,
                        green: 40,
                        undecided: 30,
                    }),
                    status: Some("Trial Number: 3/10"),
                    ..Overlay::default()
                };
                let stats = r.render(Some(&scene), 150, &overlay);
                r.present(&mut fb, 1920, 1080).expect("present");
                black_box(stats);
            },
            BatchSize::SmallInput,
        )
    });

    g.bench_function("countdown_frame", |b| {
        b.iter_batched(
            harness,
            |(mut r, scene, mut fb)| {
                let overlay = Overlay {
                    countdown: Some(3),
                    ..Overlay::default()
                };
                black_box(r.render(Some(&scene), 0, &overlay));
                r.present(&mut fb, 1920, 1080).expect("present");
            },
            BatchSize::SmallInput,
        )
    });

    g.finish();
}

criterion_group!(benches, bench_playback_frame);
criterion_main!(benches);
