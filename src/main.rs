//  src/main.rs
//! Демонстрация потоковой точности на синтетических батчах.

use rustyasg_streaming::config::EvalConfig;
use rustyasg_streaming::prelude::*;

use clap::Parser;
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayD, Axis};
use ndarray_rand::rand_distr::Uniform;
use ndarray_rand::RandomExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::path::PathBuf;

/// Аргументы командной строки
#[derive(Parser, Debug)]
#[command(author, version, about = "Streaming accuracy over synthetic batches", long_about = None)]
struct Args {
    /// JSON-файл с конфигурацией прогона
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Число батчей (перекрывает файл)
    #[arg(long)]
    batches: Option<usize>,

    /// Размер батча (перекрывает файл)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Число классов (перекрывает файл)
    #[arg(long)]
    num_classes: Option<usize>,

    #[arg(long)]
    seed: Option<u64>,

    /// Доля "шумных" предсказаний (перекрывает файл)
    #[arg(long)]
    label_noise: Option<f32>,
}

impl Args {
    fn into_config(self) -> Result<EvalConfig, Box<dyn std::error::Error>> {
        let mut config = match &self.config {
            Some(path) => EvalConfig::from_json_file(path)?,
            None => EvalConfig::default(),
        };
        if let Some(v) = self.batches {
            config.batches = v;
        }
        if let Some(v) = self.batch_size {
            config.batch_size = v;
        }
        if let Some(v) = self.num_classes {
            config.num_classes = v;
        }
        if let Some(v) = self.seed {
            config.seed = v;
        }
        if let Some(v) = self.label_noise {
            config.label_noise = v;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = Args::parse().into_config()?;
    info!("{:?}", config);

    // ---------- 1. Объявление ----------
    let context = GraphContext::shared();
    let targets = Tensor::new_input_with_shape(&context, "targets", vec![config.batch_size], DType::I32);
    let predictions = Tensor::new_input_with_shape(
        &context,
        "predictions",
        vec![config.batch_size, config.num_classes],
        DType::F32,
    );

    let mut collections = Collections::new();
    let mut accuracy = StreamingMetric::accuracy();
    accuracy.compute(
        &targets,
        &predictions,
        None,
        ComputeOptions::new()
            .with_collections(&mut collections)
            .with_metrics_collections(["metrics"])
            .with_updates_collections(["updates"])
            .with_scope(Scope::new("eval/accuracy")),
    )?;
    let batch_accuracy = accuracy.batch_value();
    info!("Граф объявлен: {} узлов", context.borrow().main_graph().nodes.len());

    // ---------- 2. Выполнение ----------
    let backend = CpuBackend::new();
    let mut rng = StdRng::seed_from_u64(config.seed);
    for step in 0..config.batches {
        let feed = synthetic_batch(&config, &mut rng);
        collections.run_updates("updates", &backend, &feed)?;
        let running = collections.reads("metrics");
        for (name, value) in &running {
            println!(
                "batch {:>3}: batch_accuracy={:.4} {}={:.4}",
                step + 1,
                batch_accuracy.get(),
                name,
                value
            );
        }
    }

    let state = accuracy.value().snapshot();
    info!(
        "Итог: accuracy={:.4} по {} примерам",
        state.value(),
        state.running_weight
    );
    println!("{}", serde_json::to_string_pretty(&state)?);
    Ok(())
}

/// Создает один батч: случайные метки и "предсказания" модели.
///
/// Для доли `1 - label_noise` примеров у верного класса добавляется
/// большой вес, затем каждая строка нормируется в распределение.
fn synthetic_batch(config: &EvalConfig, rng: &mut StdRng) -> HashMap<String, Value> {
    let labels: Array1<f32> = Array1::from_shape_fn(config.batch_size, |_| rng.gen_range(0..config.num_classes) as f32);
    let mut scores: Array2<f32> = Array2::random_using(
        (config.batch_size, config.num_classes),
        Uniform::new(0.0f32, 1.0),
        rng,
    );
    for (mut row, &label) in scores.axis_iter_mut(Axis(0)).zip(labels.iter()) {
        if rng.gen::<f32>() >= config.label_noise {
            row[label as usize] += 1.0;
        }
        let sum = row.sum();
        row /= sum;
    }
    debug!("batch labels: {:?}", labels);

    let targets: ArrayD<f32> = labels.into_dyn();
    HashMap::from([
        ("targets".to_string(), Value::Tensor(targets)),
        ("predictions".to_string(), Value::Tensor(scores.into_dyn())),
    ])
}
