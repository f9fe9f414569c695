use crate::models::{Ad, AddressDetailed, Image, Price};
use chrono::{Local, TimeZone};
use std::borrow::Cow;

/// Hard cap on the whole rendered message, in characters.
pub const MESSAGE_BUDGET: usize = 700;
/// Room kept free after the description for the lines that follow it.
const DESCRIPTION_RESERVE: i64 = 50;

const LISTING_BASE_URL: &str = "https://avito.ru/";
const PROMOTION_MARK: &str = " 🢁";

/// Markers that sellers put in front of a keyword dump at the end of a description.
/// Order matters: the first marker present anywhere in the text wins.
const SEARCH_TAG_MARKERS: &[&str] = &[
    "Теги для поиска:",
    "Теги для поиска :",
    "ТЕГИ ДЛЯ ПОИСКА:",
    "ТЕГИ ДЛЯ ПОИСКА :",
    "Теги для поиска",
    "ТЕГИ ДЛЯ ПОИСКА",
    "Теги поиска:",
    "Теги поиска :",
    "ТЕГИ ПОИСКА:",
    "ТЕГИ ПОИСКА :",
    "Поисковые теги:",
    "Поисковые теги :",
    "ПОИСКОВЫЕ ТЕГИ:",
    "ПОИСКОВЫЕ ТЕГИ :",
    "Ключевые слова:",
    "Ключевые слова :",
    "КЛЮЧЕВЫЕ СЛОВА:",
    "КЛЮЧЕВЫЕ СЛОВА :",
    "Tags for search:",
    "TAGS FOR SEARCH:",
    "Search tags:",
    "SEARCH TAGS:",
    "Keywords:",
    "KEYWORDS:",
    "Теги:",
    "ТЕГИ:",
    "Tags:",
    "TAGS:",
    "Теги для поиска -",
    "Теги для поиска - ",
    "Теги для поиска—",
    "Теги для поиска —",
    "ТЕГИ ДЛЯ ПОИСКА -",
    "ТЕГИ ДЛЯ ПОИСКА —",
    // Latin letters mixed into Cyrillic words
    "Tеги для поиска:",
    "Тags для поиска:",
    "Теgи для поиска:",
    "теги для поиска:",
    "теги для поиска :",
    " теги для поиска:",
    " теги для поиска :",
    "Теги для поиска.",
    "ТЕГИ ДЛЯ ПОИСКА.",
    "Теги для поиска...",
    "ТЕГИ ДЛЯ ПОИСКА...",
    "Для поиска: ",
];

/// Target markup of a platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// Telegram `parse_mode=HTML`
    Html,
    /// VK bots: no markup at all
    Plain,
}

impl Flavor {
    fn thousands_separator(self) -> char {
        match self {
            Flavor::Html => '.',
            Flavor::Plain => ' ',
        }
    }

    fn title(self, title: &str) -> String {
        match self {
            Flavor::Html => format!("<b>{}</b>", title),
            Flavor::Plain => title.to_string(),
        }
    }

    fn price(self, amount: &str) -> String {
        match self {
            Flavor::Html => format!("💰<b>{} ₽</b>", amount),
            Flavor::Plain => format!("💰 {} ₽", amount),
        }
    }

    fn description(self, description: &str) -> String {
        match self {
            Flavor::Html => format!("<blockquote>{}</blockquote>", description),
            Flavor::Plain => description.to_string(),
        }
    }
}

/// Render an ad into the message text for one platform.
///
/// Lines come in a fixed order: title, price, address, link, description, publish time.
/// Absent fields produce no line. The ad itself is never modified.
pub fn format_ad(ad: &Ad, flavor: Flavor) -> String {
    let mut parts: Vec<String> = Vec::new();

    if let Some(title) = ad.title.as_deref().filter(|t| !t.is_empty()) {
        parts.push(flavor.title(title));
    }

    if let Some(price) = format_price(ad, flavor) {
        parts.push(price);
    }

    if let Some(address) = &ad.address_detailed {
        match extract_location_name(address) {
            Some(location) => parts.push(format!("🏠 {}", location)),
            None => tracing::warn!("Could not extract location name from address: {:?}", address),
        }
    }

    if let Some(id) = ad.id.as_deref().filter(|id| !id.is_empty()) {
        parts.push(format!("🔍 {}{}\n", LISTING_BASE_URL, id));
    }

    if let Some(description) = ad.description.as_deref().filter(|d| !d.is_empty()) {
        let trimmed = trim_search_tags(description);
        let used = parts.join("\n").chars().count();
        let description = truncate_description(&trimmed, used);
        parts.push(flavor.description(&description));
    }

    if let Some(raw) = ad.sort_time_stamp.as_deref().filter(|ts| !ts.is_empty()) {
        let published = format_timestamp(raw).unwrap_or_else(|| raw.to_string());
        parts.push(format!("\n📅 {}", published));
    }

    parts.join("\n")
}

/// Price line, or `None` when there is no price or it is "0".
/// Amounts that do not parse as numbers are shown as given.
pub fn format_price(ad: &Ad, flavor: Flavor) -> Option<String> {
    let price = ad
        .price
        .as_ref()
        .filter(|p| !p.is_blank())
        .or(ad.price_detailed.as_ref())
        .map(Price::as_text)?;

    if price.is_empty() || price == "0" {
        return None;
    }

    let amount = parse_integer_amount(&price)
        .map(|n| group_thousands(n, flavor.thousands_separator()))
        .unwrap_or(price);

    let mut line = flavor.price(&amount);
    if ad.is_promotion {
        line.push_str(PROMOTION_MARK);
    }
    Some(line)
}

fn parse_integer_amount(price: &str) -> Option<i64> {
    let value = price.trim().parse::<f64>().ok()?;
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(value.trunc() as i64)
}

/// `1234567` with '.' -> `1.234.567`
pub fn group_thousands(value: i64, separator: char) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);

    if value < 0 {
        grouped.push('-');
    }
    for (i, digit) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(separator);
        }
        grouped.push(digit);
    }

    grouped
}

/// Location name from a detailed address. Structured addresses are read directly,
/// serialized ones are searched for `locationName = '...'`.
pub fn extract_location_name(address: &AddressDetailed) -> Option<String> {
    match address {
        AddressDetailed::Structured { location_name } => location_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string),
        AddressDetailed::Raw(blob) => {
            let location_regex =
                regex::Regex::new(r#"(?i)locationName\s*=\s*['"]([^'"]+)['"]"#).ok()?;
            location_regex
                .captures(blob)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().trim().to_string())
                .filter(|name| !name.is_empty())
        }
    }
}

/// Cut the description right after the first known search-tag marker.
pub fn trim_search_tags(description: &str) -> Cow<'_, str> {
    for marker in SEARCH_TAG_MARKERS {
        if let Some(idx) = description.find(marker) {
            return Cow::Owned(format!("{}{} ...", &description[..idx], marker));
        }
    }
    Cow::Borrowed(description)
}

/// Shorten the description so the whole message stays within [`MESSAGE_BUDGET`].
///
/// `used` is the length in characters of everything rendered before the description.
/// The cut lands on the last space inside the allowed prefix.
pub fn truncate_description(description: &str, used: usize) -> Cow<'_, str> {
    let available = MESSAGE_BUDGET as i64 - used as i64 - DESCRIPTION_RESERVE;
    if available <= DESCRIPTION_RESERVE {
        return Cow::Borrowed(description);
    }

    let available = available as usize;
    if description.chars().count() <= available {
        return Cow::Borrowed(description);
    }

    let end = description
        .char_indices()
        .nth(available)
        .map(|(idx, _)| idx)
        .unwrap_or(description.len());
    let mut truncated = &description[..end];
    if let Some(last_space) = truncated.rfind(' ') {
        if last_space > 0 {
            truncated = &truncated[..last_space];
        }
    }

    Cow::Owned(format!("{}...", truncated))
}

/// `DD.MM.YYYY HH:MM:SS` in local time. Values above 10^12 are taken as milliseconds.
pub fn format_timestamp(raw: &str) -> Option<String> {
    let mut seconds = raw.trim().parse::<f64>().ok()?;
    if !seconds.is_finite() {
        return None;
    }
    if seconds > 1_000_000_000_000.0 {
        seconds /= 1000.0;
    }

    let whole = seconds.floor();
    let nanos = ((seconds - whole) * 1e9) as u32;
    let published = Local.timestamp_opt(whole as i64, nanos).single()?;
    Some(published.format("%d.%m.%Y %H:%M:%S").to_string())
}

/// URL of the highest resolution variant of the ad's first photo.
pub fn largest_image_url(ad: &Ad) -> Option<String> {
    ad.images.iter().find_map(best_resolution_url)
}

fn best_resolution_url(image: &Image) -> Option<String> {
    image
        .root
        .iter()
        .filter_map(|(resolution, url)| parse_resolution(resolution).map(|area| (area, url)))
        .max_by_key(|(area, _)| *area)
        .map(|(_, url)| url.clone())
}

fn parse_resolution(resolution: &str) -> Option<u64> {
    let (width, height) = resolution.split_once('x')?;
    let width = width.trim().parse::<u64>().ok()?;
    let height = height.trim().parse::<u64>().ok()?;
    Some(width * height)
}
