use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use layers::{
    activations::ActivationKind,
    dtypes::PrecisionPolicy,
    linear::LinearInit,
    mlp::{FeedForward, FeedForwardConfig, FeedForwardLayer},
    norm::NormConfig,
    residual::{Dropout, ResidualNorm},
};

fn bench_sublayer(c: &mut Criterion) {
    let device = Device::Cpu;
    let batch = 1usize;
    let seq = 128usize;

    for &dtype in &[DType::F32, DType::BF16] {
        let mut group = c.benchmark_group(format!("ffn_residual/{dtype:?}"));
        for &hidden in &[256usize, 1024] {
            let varmap = VarMap::new();
            let vb = VarBuilder::from_varmap(&varmap, dtype, &device);
            let ffn = FeedForward::load(
                FeedForwardConfig::new(hidden, hidden * 4, ActivationKind::Gelu),
                &LinearInit::XavierNormal,
                vb.pp("ff"),
            )
            .expect("ffn init");
            let residual = ResidualNorm::load(NormConfig::new(hidden), Dropout::new(None), vb.pp("norm"))
                .expect("norm init");
            let input = Tensor::randn(0f32, 1.0, (batch, seq, hidden), &device)
                .expect("input")
                .to_dtype(dtype)
                .expect("cast input");
            let policy = PrecisionPolicy::from_parameter_dtype(dtype);

            group.throughput(Throughput::Elements((batch * seq * hidden) as u64));
            group.bench_with_input(BenchmarkId::new("hidden", hidden), &input, |b, input| {
                b.iter(|| {
                    let branch = ffn.forward(black_box(input), &policy, false).expect("ffn");
                    let out = residual
                        .forward(input, &branch, &policy, false)
                        .expect("residual");
                    black_box(out);
                });
            });
        }
        group.finish();
    }
}

criterion_group!(benches, bench_sublayer);
criterion_main!(benches);
