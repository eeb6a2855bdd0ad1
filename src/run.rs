//! End-to-end workflow: data -> model -> training -> evaluation -> export

use std::path::{Path, PathBuf};

use burn::module::AutodiffModule;
use burn::tensor::backend::{AutodiffBackend, Backend};
use colored::Colorize;
use tracing::{info, warn};

use crate::backend::{default_device, TrainingBackend};
use crate::config::{ExportConfig, PipelineConfig};
use crate::dataset::preview::save_preview_grid;
use crate::dataset::{
    acquire_dataset, build_manifest, split_manifest, BatchAugmenter, ClassWeights, DataPipeline,
    DatasetSplit, LabelEncoder, ManifestStats, SpoofDataset,
};
use crate::export::{
    archive_directory, export_saved_model, export_web_model, load_saved_model, run_external_converter,
    ModelMetadata,
};
use crate::model::{build_model, SpoofClassifier};
use crate::training::{
    evaluate, plot_history, CsvLogger, EvalMetrics, MetricsRecorder, Trainer, TrainingHistory, TrainingOutcome,
};
use crate::utils::error::Result;

/// Split, encoded labels, weights and the two pipelines
pub struct PreparedData {
    pub stats: ManifestStats,
    pub split: DatasetSplit,
    pub encoder: LabelEncoder,
    pub class_weights: ClassWeights,
    pub train: DataPipeline,
    pub validation: DataPipeline,
}

/// Files written by the export stage
#[derive(Debug, Clone)]
pub struct ExportArtifacts {
    pub saved_model_dir: PathBuf,
    pub web_model_dir: PathBuf,
    pub saved_model_archive: PathBuf,
    pub web_model_archive: PathBuf,
}

/// Summary of a full training run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub evaluation: EvalMetrics,
    pub history: TrainingHistory,
    pub outcome: TrainingOutcome,
    pub best_epoch: Option<usize>,
    pub classes: Vec<String>,
    pub class_weights: ClassWeights,
    pub artifacts: ExportArtifacts,
}

/// Manifest, split, label encoding, class weights and pipelines
pub fn prepare_data(config: &PipelineConfig) -> Result<PreparedData> {
    let samples = build_manifest(&config.dataset.data_dir)?;
    let stats = ManifestStats::from_samples(&samples);
    stats.print();

    let split = split_manifest(samples, config.dataset.train_split, config.dataset.seed)?;

    let (encoder, train_labels) = LabelEncoder::fit_transform(&split.train_labels());
    encoder.ensure_num_classes(config.model.num_classes)?;
    encoder.transform(&split.validation_labels())?;
    info!("Classes: {:?}", encoder.classes());

    let class_weights = ClassWeights::from_labels(&train_labels, encoder.len())?;
    info!("Class weights: {}", class_weights);

    let train = DataPipeline::train(
        SpoofDataset::from_samples(&split.train, &encoder)?,
        BatchAugmenter::new(config.augmentation.clone()),
        &config.preprocessing,
        config.training.seed,
    )?;
    let validation = DataPipeline::eval(
        SpoofDataset::from_samples(&split.validation, &encoder)?,
        &config.preprocessing,
    )?;

    Ok(PreparedData {
        stats,
        split,
        encoder,
        class_weights,
        train,
        validation,
    })
}

/// Saved-model and web-model directories, optional converter, tar archives
pub fn export_model<B: Backend>(
    model: &SpoofClassifier<B>,
    metadata: &ModelMetadata,
    export: &ExportConfig,
) -> Result<ExportArtifacts> {
    let saved_model_dir = export.path(&export.saved_model_dir);
    let web_model_dir = export.path(&export.web_model_dir);

    export_saved_model(model, &saved_model_dir, metadata)?;
    export_web_model(model, &web_model_dir, metadata)?;
    if let Some(converter) = &export.converter {
        run_external_converter(converter, &saved_model_dir, &web_model_dir)?;
    }

    let saved_model_archive = archive_directory(&saved_model_dir, &export.path(&export.saved_model_archive))?;
    let web_model_archive = archive_directory(&web_model_dir, &export.path(&export.web_model_archive))?;

    Ok(ExportArtifacts {
        saved_model_dir,
        web_model_dir,
        saved_model_archive,
        web_model_archive,
    })
}

/// Train, evaluate and export on an explicit autodiff backend
pub fn run_training_on<B: AutodiffBackend>(config: &PipelineConfig, device: B::Device) -> Result<RunReport> {
    config.validate()?;
    let export = &config.export;
    std::fs::create_dir_all(&export.output_dir)?;

    let data = prepare_data(config)?;

    if let Some(preview) = &export.preview {
        match data
            .train
            .first_batch(0)
            .and_then(|batch| save_preview_grid(&batch, &data.encoder, &export.path(preview)))
        {
            Ok(labels) => info!("Preview grid labels: {:?}", labels),
            Err(e) => warn!("Skipping preview grid: {}", e),
        }
    }

    let model = build_model::<B>(&config.model, &device)?;

    let mut trainer = Trainer::<B>::new(&config.training, data.class_weights.clone(), device)
        .with_callback(Box::new(CsvLogger::new(export.path(&export.csv_log))))
        .with_callback(Box::new(MetricsRecorder::new(
            export.path(&export.log_dir),
            config.training.histogram_freq,
        )));
    let result = trainer.fit(model, &data.train, &data.validation)?;

    let model = result.model.valid();
    let evaluation = evaluate(&model, &data.validation)?;
    println!("Accuracy: {:.2}%", evaluation.accuracy_percent());

    result.history.save(&export.path(&export.history))?;
    plot_history(&result.history, &export.path(&export.plot))?;

    let metadata = ModelMetadata::new(&data.encoder, config.preprocessing.image_size, &config.model);
    let artifacts = export_model(&model, &metadata, export)?;

    Ok(RunReport {
        evaluation,
        history: result.history,
        outcome: result.outcome,
        best_epoch: result.best_epoch,
        classes: data.encoder.classes().to_vec(),
        class_weights: data.class_weights,
        artifacts,
    })
}

/// Train on the compiled default backend
pub fn run_training(config: &PipelineConfig) -> Result<RunReport> {
    run_training_on::<TrainingBackend>(config, default_device())
}

/// Download and extract the dataset if needed, then train
pub fn run_pipeline(config: &PipelineConfig) -> Result<RunReport> {
    acquire_dataset(&config.dataset)?;
    run_training(config)
}

/// Reload an exported model and evaluate it on the validation split that
/// `config` reproduces
pub fn evaluate_saved_model<B: Backend>(
    config: &PipelineConfig,
    model_dir: &Path,
    device: &B::Device,
) -> Result<EvalMetrics> {
    let (model, metadata) = load_saved_model::<B>(model_dir, device)?;
    let encoder = metadata.encoder();

    let samples = build_manifest(&config.dataset.data_dir)?;
    let split = split_manifest(samples, config.dataset.train_split, config.dataset.seed)?;

    let mut preprocessing = config.preprocessing.clone();
    preprocessing.image_size = metadata.input_shape[0];
    let validation = DataPipeline::eval(SpoofDataset::from_samples(&split.validation, &encoder)?, &preprocessing)?;

    let metrics = evaluate(&model, &validation)?;
    println!(
        "{} Accuracy: {:.2}% ({} samples, loss {:.4})",
        "→".cyan(),
        metrics.accuracy_percent(),
        metrics.samples,
        metrics.loss
    );
    Ok(metrics)
}
