use crate::{
    models::{extract_year, genre_tokens, EnrichedItem, ItemId, ScoredItem},
    services::recommendations::{DisplayWindow, RecommendationBuffer},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Ordering applied to the projected items
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Descending by ranking score
    Score,
    /// Fetch order
    #[default]
    None,
}

/// User-selected year/genre filters and sort key; never affects the buffer itself
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterState {
    pub year: Option<String>,
    pub genre: Option<String>,
    #[serde(default)]
    pub sort_key: SortKey,
}

impl FilterState {
    pub fn with_year(mut self, year: impl Into<String>) -> Self {
        self.year = Some(year.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn sorted_by(mut self, sort_key: SortKey) -> Self {
        self.sort_key = sort_key;
        self
    }

    fn year_filter(&self) -> Option<&str> {
        self.year.as_deref().map(str::trim).filter(|y| !y.is_empty())
    }

    fn genre_filter(&self) -> Option<&str> {
        self.genre.as_deref().map(str::trim).filter(|g| !g.is_empty())
    }

    pub fn is_active(&self) -> bool {
        self.year_filter().is_some() || self.genre_filter().is_some()
    }
}

/// Projects the revealed prefix of `buffer` under `filter`
///
/// Items beyond `window` are never returned, whatever the filter.
pub fn project<'a>(
    buffer: &'a RecommendationBuffer,
    window: DisplayWindow,
    filter: &FilterState,
) -> Vec<&'a ScoredItem> {
    project_with_details(buffer, window, filter, &HashMap::new())
}

/// Like [`project`], also matching against enrichment data already known for an item
pub fn project_with_details<'a>(
    buffer: &'a RecommendationBuffer,
    window: DisplayWindow,
    filter: &FilterState,
    details: &HashMap<ItemId, EnrichedItem>,
) -> Vec<&'a ScoredItem> {
    let revealed = &buffer.items()[..window.len().min(buffer.len())];

    let mut projected: Vec<&ScoredItem> = revealed
        .iter()
        .filter(|scored| {
            let enriched = details.get(&scored.item.id);
            filter
                .year_filter()
                .is_none_or(|year| matches_year(scored, enriched, year))
                && filter
                    .genre_filter()
                    .is_none_or(|genre| matches_genre(scored, enriched, genre))
        })
        .collect();

    if filter.sort_key == SortKey::Score {
        projected.sort_by(|a, b| b.score.total_cmp(&a.score));
    }

    projected
}

fn matches_year(scored: &ScoredItem, enriched: Option<&EnrichedItem>, year: &str) -> bool {
    let from_title = extract_year(&scored.item.title);
    let from_details = enriched.and_then(|e| e.year);

    [from_title, from_details]
        .into_iter()
        .flatten()
        .any(|y| y.to_string() == year)
}

fn matches_genre(scored: &ScoredItem, enriched: Option<&EnrichedItem>, genre: &str) -> bool {
    let wanted = genre.to_lowercase();

    let in_catalog = scored
        .item
        .genres
        .as_deref()
        .is_some_and(|field| genre_tokens(field).any(|g| g.to_lowercase() == wanted));

    let in_details = enriched.is_some_and(|e| {
        e.genre_names
            .iter()
            .any(|g| g.trim().to_lowercase() == wanted)
    });

    in_catalog || in_details
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{Algorithm, CatalogItem, EnrichmentSource},
        services::recommendations::{grow_window, BufferKey},
    };
    use chrono::Utc;

    fn scored(id: u64, title: &str, genres: &str, score: f64) -> ScoredItem {
        ScoredItem {
            item: CatalogItem::new(id, title).with_genres(genres),
            score,
        }
    }

    fn buffer() -> RecommendationBuffer {
        RecommendationBuffer::new(
            BufferKey {
                source: ItemId(2571),
                algorithm: Algorithm::Hybrid,
            },
            vec![
                scored(1, "Matrix Reloaded, The (2003)", "Action|Sci-Fi|Thriller", 0.71),
                scored(2, "Dark City (1998)", "Adventure|Film-Noir|Sci-Fi", 0.93),
                scored(3, "Heat (1995)", "Action|Crime", 0.55),
                scored(4, "Matrix Revolutions, The (2003)", "Action | Sci-Fi", 0.88),
                scored(5, "Equilibrium (2002)", "Action|Sci-Fi", 0.99),
            ],
        )
    }

    fn ids(items: &[&ScoredItem]) -> Vec<u64> {
        items.iter().map(|s| s.item.id.0).collect()
    }

    fn window_of(buffer: &RecommendationBuffer, len: usize) -> DisplayWindow {
        grow_window(buffer, DisplayWindow::default(), len)
    }

    #[test]
    fn test_no_filter_preserves_fetch_order() {
        let buffer = buffer();
        let projected = project(&buffer, window_of(&buffer, 5), &FilterState::default());
        assert_eq!(ids(&projected), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_never_reveals_beyond_window() {
        let buffer = buffer();
        let window = window_of(&buffer, 3);

        let by_genre = project(&buffer, window, &FilterState::default().with_genre("sci-fi"));
        assert_eq!(ids(&by_genre), vec![1, 2]);

        let by_year = project(&buffer, window, &FilterState::default().with_year("2002"));
        assert!(by_year.is_empty());
    }

    #[test]
    fn test_year_filter_uses_title_year() {
        let buffer = buffer();
        let projected = project(&buffer, window_of(&buffer, 5), &FilterState::default().with_year("2003"));
        assert_eq!(ids(&projected), vec![1, 4]);
    }

    #[test]
    fn test_genre_filter_is_case_insensitive_and_trimmed() {
        let buffer = buffer();
        let window = window_of(&buffer, 5);

        let projected = project(&buffer, window, &FilterState::default().with_genre("  ACTION "));
        assert_eq!(ids(&projected), vec![1, 3, 4, 5]);

        let partial = project(&buffer, window, &FilterState::default().with_genre("Sci"));
        assert!(partial.is_empty());
    }

    #[test]
    fn test_blank_filters_are_ignored() {
        let buffer = buffer();
        let filter = FilterState::default().with_year(" ").with_genre("");
        assert!(!filter.is_active());
        assert_eq!(project(&buffer, window_of(&buffer, 5), &filter).len(), 5);
    }

    #[test]
    fn test_score_sort_descends() {
        let buffer = buffer();
        let filter = FilterState::default().with_genre("sci-fi").sorted_by(SortKey::Score);
        let projected = project(&buffer, window_of(&buffer, 5), &filter);
        assert_eq!(ids(&projected), vec![5, 2, 4, 1]);
    }

    #[test]
    fn test_projection_is_repeatable() {
        let buffer = buffer();
        let filter = FilterState::default().sorted_by(SortKey::Score);
        let window = window_of(&buffer, 4);
        let first = ids(&project(&buffer, window, &filter));
        let second = ids(&project(&buffer, window, &filter));
        assert_eq!(first, second);
        assert_eq!(ids(&project(&buffer, window, &FilterState::default())), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_enrichment_data_participates_in_matching() {
        let buffer = RecommendationBuffer::new(
            BufferKey {
                source: ItemId(1),
                algorithm: Algorithm::ContentBased,
            },
            vec![ScoredItem {
                item: CatalogItem::new(10, "Untitled Project"),
                score: 0.5,
            }],
        );
        let mut details = HashMap::new();
        details.insert(
            ItemId(10),
            EnrichedItem {
                item: CatalogItem::new(10, "Untitled Project"),
                poster_url: "poster.jpg".to_string(),
                year: Some(2019),
                genre_names: vec!["Фантастика".to_string()],
                overview: None,
                locale: "uk-UA".to_string(),
                source: EnrichmentSource::Metadata,
                enriched_at: Utc::now(),
            },
        );
        let window = window_of(&buffer, 1);

        let by_year = FilterState::default().with_year("2019");
        assert_eq!(project(&buffer, window, &by_year).len(), 0);
        assert_eq!(project_with_details(&buffer, window, &by_year, &details).len(), 1);

        let by_genre = FilterState::default().with_genre("фантастика");
        assert_eq!(project_with_details(&buffer, window, &by_genre, &details).len(), 1);
    }
}
