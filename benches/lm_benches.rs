use criterion::{Criterion, criterion_group, criterion_main};
use RustedLMFit::Examples::lm_examples::{reference_p0, reference_t, reference_y};
use RustedLMFit::numerical::optimization::lm_config::{DampingUpdate, LMConfig};
use RustedLMFit::numerical::optimization::lm_gavin::LevenbergMarquardtGavin;
use RustedLMFit::numerical::optimization::lm_models::TripleExponential;
use std::hint::black_box;

fn bench_reference_problem(c: &mut Criterion) {
    let t = reference_t();
    let y = reference_y();
    let mut group = c.benchmark_group("LM reference problem");
    for damping_update in [DampingUpdate::Levenberg, DampingUpdate::Nielsen] {
        let config = LMConfig::default()
            .with_damping_update(damping_update)
            .with_loglevel(None);
        let lm = LevenbergMarquardtGavin::new(TripleExponential, config);
        group.bench_function(format!("{}", damping_update), |b| {
            b.iter(|| lm.fit(black_box(reference_p0()), &t, &y))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_reference_problem);
criterion_main!(benches);
