use crate::domain::Chunk;

/// Packs ranked chunks into a context string no longer than `budget` characters.
///
/// Chunks are taken in the order given. Accumulation stops at the first block
/// that would overflow the budget, even if a later, smaller block would fit.
pub fn build_context(chunks: &[Chunk], budget: usize) -> String {
    let mut context = String::new();
    let mut total_chars = 0usize;

    for chunk in chunks {
        let block = format_block(chunk);
        let block_chars = block.chars().count();
        if total_chars + block_chars > budget {
            break;
        }
        context.push_str(&block);
        total_chars += block_chars;
    }

    context
}

fn format_block(chunk: &Chunk) -> String {
    let page = chunk
        .page()
        .map(|p| p.to_string())
        .unwrap_or_else(|| "?".to_string());
    format!("[Page {page}]\n{}\n\n", chunk.content)
}
