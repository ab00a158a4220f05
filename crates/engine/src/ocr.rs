use base64::{engine::general_purpose, Engine as _};
use image::DynamicImage;

use studyrag_core::SECTION_SENTINEL;
use studyrag_llm::{ChatMessage, LlmClient, ProviderConfig, ResponseState};

/// Longest edge uploaded to the vision model.
pub const MAX_PAGE_EDGE_PX: u32 = 1200;
const JPEG_QUALITY: u8 = 85;
const MIN_OUTPUT_TOKENS: u32 = 512;
const MIN_RECOMMENDED_TOKENS: u32 = 256;

/// One rendered page plus its human label ("第 3 页").
pub struct PageImage {
    pub image: DynamicImage,
    pub label: String,
}

/// Transcribe one page image through the vision provider.
///
/// Failures are absorbed: an unreachable provider or an Error terminal
/// state yields the empty string and an error log, and the build goes on
/// with a blank page.
pub async fn recognize_page(page: &PageImage, vision: &ProviderConfig) -> String {
    let encoded = match encode_page(&page.image) {
        Some(encoded) => encoded,
        None => return String::new(),
    };
    let max_output = vision.max_context_tokens.max(MIN_OUTPUT_TOKENS);
    let recommended = ((max_output as f64 * 0.7) as u32).max(MIN_RECOMMENDED_TOKENS);

    let mut client = LlmClient::new();
    client.set_system_prompt(system_prompt());
    let message = ChatMessage::user_with_image(
        page_prompt(&page.label, recommended, max_output),
        encoded,
        "image/jpeg",
    );
    if let Err(err) = client.send_message(message, &[], vision) {
        tracing::error!("OCR request for {} could not start: {err}", page.label);
        return String::new();
    }
    match client.await_terminal().await {
        ResponseState::Success { content } => content.trim().to_string(),
        ResponseState::Error { message } => {
            tracing::error!("OCR for {} failed: {message}", page.label);
            String::new()
        }
        _ => String::new(),
    }
}

/// Downscale to the upload bound, JPEG-encode, base64 without wrapping.
fn encode_page(image: &DynamicImage) -> Option<String> {
    let scaled = scale_for_upload(image);
    let rgb = DynamicImage::ImageRgb8(scaled.to_rgb8());
    let mut buffer = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
    if let Err(err) = rgb.write_with_encoder(encoder) {
        tracing::warn!("failed to JPEG-encode page image: {err}");
        return None;
    }
    Some(general_purpose::STANDARD.encode(&buffer))
}

fn scale_for_upload(image: &DynamicImage) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    let long_edge = width.max(height);
    if long_edge <= MAX_PAGE_EDGE_PX {
        return image.clone();
    }
    let ratio = MAX_PAGE_EDGE_PX as f64 / long_edge as f64;
    let new_width = ((width as f64 * ratio) as u32).max(1);
    let new_height = ((height as f64 * ratio) as u32).max(1);
    image.resize(new_width, new_height, image::imageops::FilterType::Triangle)
}

fn system_prompt() -> String {
    format!(
        "你是一名严谨的文档转写助手。请逐字识别图片中的全部文字，保留原有段落结构，\
         不要添加任何解释、翻译或评论。每个逻辑小节结束后，单独输出一行 {SECTION_SENTINEL}；\
         除此之外不要在任何其他位置输出该标记。"
    )
}

fn page_prompt(label: &str, recommended: u32, max_output: u32) -> String {
    format!(
        "请识别{label}的全部文字内容，按原文顺序输出。\
         目标长度约 {recommended} 个 token，最多不超过 {max_output} 个 token。"
    )
}
