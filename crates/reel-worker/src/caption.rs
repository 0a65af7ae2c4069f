//! Post captions.

use reel_models::ContentItem;
use reel_publish::truncate_caption;

/// Build the caption for `item`, cut to the platform limit.
///
/// ```text
/// {headline}
///
/// Categoria: {category}
/// Leia mais: {link}
/// {hashtags}
/// ```
///
/// Empty link and hashtag lines are left out.
pub fn build_caption(item: &ContentItem, default_category: &str, hashtags: &str) -> String {
    let mut caption = format!(
        "{}\n\nCategoria: {}",
        item.headline.trim(),
        item.category_or(default_category)
    );
    if !item.link.trim().is_empty() {
        caption.push_str("\nLeia mais: ");
        caption.push_str(item.link.trim());
    }
    if !hashtags.trim().is_empty() {
        caption.push('\n');
        caption.push_str(hashtags.trim());
    }
    truncate_caption(&caption).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::DEFAULT_CATEGORY;
    use reel_publish::MAX_CAPTION_CHARS;

    #[test]
    fn test_caption_layout() {
        let item = ContentItem::new(42u64, "Balsa volta a operar")
            .with_category("NOTÍCIAS")
            .with_link("https://site.example/42");
        assert_eq!(
            build_caption(&item, DEFAULT_CATEGORY, "#Ilhabela #Litoral"),
            "Balsa volta a operar\n\nCategoria: NOTÍCIAS\nLeia mais: https://site.example/42\n#Ilhabela #Litoral"
        );
    }

    #[test]
    fn test_caption_without_link_or_tags() {
        let item = ContentItem::new(1u64, "Headline");
        assert_eq!(
            build_caption(&item, DEFAULT_CATEGORY, " "),
            format!("Headline\n\nCategoria: {DEFAULT_CATEGORY}")
        );
    }

    #[test]
    fn test_caption_truncated() {
        let item = ContentItem::new(1u64, "á".repeat(3000));
        let caption = build_caption(&item, DEFAULT_CATEGORY, "#tag");
        assert_eq!(caption.chars().count(), MAX_CAPTION_CHARS);
    }
}
