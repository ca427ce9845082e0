use candle_core::{DType, Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use model::{DecoderMode, Model, ModelConfig};

fn bench_decode_step(c: &mut Criterion) {
    let device = Device::Cpu;
    let mut group = c.benchmark_group("decode_step");
    for &mode in &[DecoderMode::EncoderOutput, DecoderMode::CrossAttention] {
        let config = ModelConfig {
            vocab_size: 1024,
            dim: 128,
            encoder_depth: 1,
            decoder_depth: 4,
            max_seq_len: 128,
            head_num: 4,
            ff_dim: 512,
            dropout: None,
            layer_norm_eps: 1e-5,
            decoder_mode: mode,
            pad_id: 0,
            dtype: DType::F32,
            device: device.clone(),
        };
        let model = Model::new(config).expect("model init");
        let mut ids = vec![0u32; 128];
        for (i, id) in ids.iter_mut().take(64).enumerate() {
            *id = 1 + (i as u32 % 1000);
        }
        let source = Tensor::from_vec(ids, (1, 128), &device).expect("source ids");
        let mask = source.ne(0u32).expect("source mask");
        let decoder = Tensor::new(&[[1u32, 5, 6, 7]], &device).expect("decoder ids");

        group.bench_with_input(BenchmarkId::new("mode", format!("{mode:?}")), &mode, |b, _| {
            b.iter(|| {
                let out = model
                    .forward(black_box(&source), black_box(&decoder), &mask, None)
                    .expect("forward");
                black_box(out.logits);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decode_step);
criterion_main!(benches);
