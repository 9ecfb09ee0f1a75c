//! CLIP model implementation using ONNX Runtime

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokenizers::Tokenizer;

use super::preprocess::{
    attention_mask, frame_token_ids, image_to_tensor_data, l2_normalize, CONTEXT_LENGTH,
    INPUT_SIZE,
};
use super::scorer::{ClipEmbedding, EmbeddingModel};
use crate::config::ClipConfig;

const VISUAL_MODEL_FILE: &str = "clip-vit-b32-vision.onnx";
const TEXT_MODEL_FILE: &str = "clip-vit-b32-text.onnx";
const TOKENIZER_FILE: &str = "clip-vit-b32-tokenizer.json";

/// CLIP visual and text encoders sharing one embedding space
pub struct ClipModel {
    visual: Mutex<Session>,
    text: Mutex<Session>,
    tokenizer: Tokenizer,
    text_attention_mask: bool,
}

impl ClipModel {
    /// Load CLIP models, downloading them into `models_dir` if needed
    pub fn load(config: &ClipConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.models_dir).with_context(|| {
            format!("Could not create models directory {}", config.models_dir.display())
        })?;

        let visual_path = ensure_model(&config.models_dir, VISUAL_MODEL_FILE, &config.visual_model_url)?;
        let text_path = ensure_model(&config.models_dir, TEXT_MODEL_FILE, &config.text_model_url)?;
        let tokenizer_path = ensure_model(&config.models_dir, TOKENIZER_FILE, &config.tokenizer_url)?;

        let mut model = Self::from_files(&visual_path, &text_path, &tokenizer_path, config.intra_threads)?;
        model.text_attention_mask = config.text_attention_mask;
        Ok(model)
    }

    /// Load CLIP models from local files
    pub fn from_files(
        visual_path: &Path,
        text_path: &Path,
        tokenizer_path: &Path,
        intra_threads: usize,
    ) -> Result<Self> {
        let visual = build_session(visual_path, intra_threads)?;
        let text = build_session(text_path, intra_threads)?;

        let tokenizer = Tokenizer::from_file(tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer: {}", e))?;

        tracing::info!(
            visual = %visual_path.display(),
            text = %text_path.display(),
            "CLIP models loaded"
        );

        Ok(Self {
            visual: Mutex::new(visual),
            text: Mutex::new(text),
            tokenizer,
            text_attention_mask: true,
        })
    }
}

impl EmbeddingModel for ClipModel {
    fn embed_image(&self, img: &DynamicImage) -> Result<ClipEmbedding> {
        let input_data = image_to_tensor_data(img);

        // Create tensor
        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input_data.into_boxed_slice(),
        ))?;

        let mut model = self
            .visual
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        // Run inference
        let outputs = model.run(ort::inputs!["pixel_values" => input_tensor])?;

        let embedding_output = outputs
            .get("image_embeds")
            .unwrap_or_else(|| &outputs[0]);

        let (shape, embedding_data) = embedding_output
            .try_extract_tensor::<f32>()
            .context("Failed to extract image embedding")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 2 && dims[0] == 1,
            "unexpected image embedding shape: {dims:?}"
        );

        Ok(l2_normalize(embedding_data.to_vec()))
    }

    fn embed_text(&self, text: &str) -> Result<ClipEmbedding> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let input_ids = frame_token_ids(encoding.get_ids());
        let mask = attention_mask(&input_ids);

        let ids_tensor = Tensor::from_array(([1usize, CONTEXT_LENGTH], input_ids.into_boxed_slice()))?;

        let mut model = self
            .text
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let outputs = if self.text_attention_mask {
            let mask_tensor = Tensor::from_array(([1usize, CONTEXT_LENGTH], mask.into_boxed_slice()))?;
            model.run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor
            ])?
        } else {
            model.run(ort::inputs!["input_ids" => ids_tensor])?
        };

        let embedding_output = outputs
            .get("text_embeds")
            .unwrap_or_else(|| &outputs[0]);

        let (shape, embedding_data) = embedding_output
            .try_extract_tensor::<f32>()
            .context("Failed to extract text embedding")?;

        let dims: &[i64] = &shape;
        anyhow::ensure!(
            dims.len() == 2 && dims[0] == 1,
            "unexpected text embedding shape: {dims:?}"
        );

        Ok(l2_normalize(embedding_data.to_vec()))
    }
}

fn build_session(path: &Path, intra_threads: usize) -> Result<Session> {
    let session = Session::builder()?
        .with_optimization_level(GraphOptimizationLevel::Level3)?
        .with_intra_threads(intra_threads.max(1))?
        .commit_from_file(path)
        .with_context(|| format!("Failed to load ONNX model {}", path.display()))?;
    Ok(session)
}

/// Download a model file if it doesn't exist
fn ensure_model(models_dir: &Path, filename: &str, url: &str) -> Result<PathBuf> {
    let model_path = models_dir.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "Downloading CLIP model...");
        let response = ureq::get(url)
            .call()
            .map_err(|e| anyhow!("Failed to download model: {}", e))?;

        // Write beside the target first so an interrupted download is not mistaken for a model
        let partial_path = models_dir.join(format!("{}.part", filename));
        let mut file = std::fs::File::create(&partial_path)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        std::fs::rename(&partial_path, &model_path)?;
        tracing::info!(model = %filename, path = ?model_path, "CLIP model downloaded");
    }

    Ok(model_path)
}
