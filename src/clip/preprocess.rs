//! Input preparation for the CLIP encoders.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};

/// CLIP visual input size (ViT-B/32)
pub const INPUT_SIZE: u32 = 224;

/// CLIP text context length
pub const CONTEXT_LENGTH: usize = 77;

/// `<|startoftext|>`
pub const BOS_TOKEN: i64 = 49406;

/// `<|endoftext|>`
pub const EOS_TOKEN: i64 = 49407;

// CLIP normalization constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// Resize the shortest side to 224, center crop, normalize, NCHW.
pub fn image_to_tensor_data(img: &DynamicImage) -> Vec<f32> {
    let size = INPUT_SIZE as usize;
    let rgb = resize_and_center_crop(img).to_rgb8();

    let mut input_data = vec![0.0f32; 3 * size * size];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * size + x as usize;
        for c in 0..3 {
            input_data[c * size * size + idx] = ((pixel[c] as f32 / 255.0) - MEAN[c]) / STD[c];
        }
    }

    input_data
}

fn resize_and_center_crop(img: &DynamicImage) -> DynamicImage {
    let (width, height) = img.dimensions();
    let shortest = width.min(height).max(1) as f32;
    let scale = INPUT_SIZE as f32 / shortest;

    let new_width = ((width as f32 * scale).round() as u32).max(INPUT_SIZE);
    let new_height = ((height as f32 * scale).round() as u32).max(INPUT_SIZE);

    let resized = img.resize_exact(new_width, new_height, FilterType::CatmullRom);
    let x = (new_width - INPUT_SIZE) / 2;
    let y = (new_height - INPUT_SIZE) / 2;
    resized.crop_imm(x, y, INPUT_SIZE, INPUT_SIZE)
}

/// Frame tokenizer output as a fixed-length CLIP input.
///
/// Guarantees a leading start token, a single end token (the text encoder
/// pools at it), truncation to [`CONTEXT_LENGTH`] and zero padding.
pub fn frame_token_ids(raw: &[u32]) -> Vec<i64> {
    let mut ids: Vec<i64> = raw.iter().map(|&id| id as i64).collect();

    if ids.first() != Some(&BOS_TOKEN) {
        ids.insert(0, BOS_TOKEN);
    }

    // Anything after the first end token is tokenizer padding
    match ids.iter().position(|&id| id == EOS_TOKEN) {
        Some(pos) => ids.truncate(pos + 1),
        None => ids.push(EOS_TOKEN),
    }

    if ids.len() > CONTEXT_LENGTH {
        ids.truncate(CONTEXT_LENGTH - 1);
        ids.push(EOS_TOKEN);
    }

    ids.resize(CONTEXT_LENGTH, 0);
    ids
}

/// Attention mask matching [`frame_token_ids`] output.
pub fn attention_mask(ids: &[i64]) -> Vec<i64> {
    let len = ids
        .iter()
        .position(|&id| id == EOS_TOKEN)
        .map_or(ids.len(), |pos| pos + 1);
    (0..ids.len()).map(|i| i64::from(i < len)).collect()
}

/// L2 normalize an embedding. Zero vectors are returned unchanged.
pub fn l2_normalize(embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}
