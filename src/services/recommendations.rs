use crate::{
    error::{EngineError, EngineResult},
    models::{Algorithm, ItemId, ScoredItem, Settled},
    services::{coalesce::Coalescer, providers::RankingProvider},
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, PoisonError};

/// Identity of a recommendation buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferKey {
    pub source: ItemId,
    pub algorithm: Algorithm,
}

/// Candidate set returned for one `(source, algorithm)` pair; immutable once fetched
#[derive(Debug, Clone, PartialEq)]
pub struct RecommendationBuffer {
    key: BufferKey,
    items: Vec<ScoredItem>,
    fetched_at: DateTime<Utc>,
}

impl RecommendationBuffer {
    pub fn new(key: BufferKey, items: Vec<ScoredItem>) -> Self {
        Self {
            key,
            items,
            fetched_at: Utc::now(),
        }
    }

    pub fn key(&self) -> BufferKey {
        self.key
    }

    pub fn items(&self) -> &[ScoredItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }
}

/// Revealed prefix length of a buffer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct DisplayWindow {
    len: usize,
}

impl DisplayWindow {
    /// First page of `buffer`, capped at its length
    pub fn initial(page_increment: usize, buffer: &RecommendationBuffer) -> Self {
        Self {
            len: page_increment.min(buffer.len()),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Reveals up to `increment` more items without ever exceeding the buffer
///
/// Pure: no data is requested; a short buffer simply caps the window.
pub fn grow_window(
    buffer: &RecommendationBuffer,
    window: DisplayWindow,
    increment: usize,
) -> DisplayWindow {
    DisplayWindow {
        len: window.len.saturating_add(increment).min(buffer.len()),
    }
}

#[derive(Debug, Default)]
struct FetcherState {
    current: Option<Arc<RecommendationBuffer>>,
    window: DisplayWindow,
    requested: Option<BufferKey>,
    generation: u64,
}

/// Caching and session boundary around the ranking service
///
/// Holds at most one buffer and its display window. A repeat request for the held
/// `(source, algorithm)` pair is answered from memory; a request for another pair replaces
/// the buffer and resets the window once it resolves, unless a newer request overtook it.
pub struct RecommendationFetcher {
    ranking: Arc<dyn RankingProvider>,
    page_increment: usize,
    state: Mutex<FetcherState>,
    in_flight: Coalescer<(BufferKey, usize), Arc<RecommendationBuffer>>,
}

impl RecommendationFetcher {
    pub fn new(ranking: Arc<dyn RankingProvider>, page_increment: usize) -> Self {
        Self {
            ranking,
            page_increment,
            state: Mutex::new(FetcherState::default()),
            in_flight: Coalescer::new("ranking"),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FetcherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn page_increment(&self) -> usize {
        self.page_increment
    }

    pub async fn fetch(
        &self,
        source: ItemId,
        algorithm: Algorithm,
        buffer_size: usize,
    ) -> EngineResult<Settled<Arc<RecommendationBuffer>>> {
        let key = BufferKey { source, algorithm };

        let generation = {
            let mut state = self.lock();
            if let Some(current) = state.current.as_ref().filter(|b| b.key == key) {
                tracing::debug!(source = %source, algorithm = %algorithm, "Reusing held recommendation buffer");
                return Ok(Settled::Current(Arc::clone(current)));
            }
            if state.requested != Some(key) {
                state.generation += 1;
                state.requested = Some(key);
            }
            state.generation
        };

        let ranking = Arc::clone(&self.ranking);
        let outcome = self
            .in_flight
            .run((key, buffer_size), move || async move {
                let mut items = ranking.recommend(source, algorithm, buffer_size).await?;
                items.truncate(buffer_size);
                Ok(Arc::new(RecommendationBuffer::new(key, items)))
            })
            .await;

        let mut state = self.lock();
        if state.generation != generation || state.requested != Some(key) {
            tracing::debug!(
                source = %source,
                algorithm = %algorithm,
                "Discarding superseded recommendation response"
            );
            return Ok(Settled::Superseded);
        }

        match outcome {
            Ok(buffer) => {
                let held = state.current.clone().filter(|b| b.key == key);
                match held {
                    Some(current) if current.len() >= buffer.len() => {
                        return Ok(Settled::Current(current));
                    }
                    // A larger buffer for the held pair keeps the revealed window
                    Some(_) => {}
                    None => state.window = DisplayWindow::initial(self.page_increment, &buffer),
                }
                state.current = Some(Arc::clone(&buffer));

                tracing::info!(
                    source = %source,
                    algorithm = %algorithm,
                    candidates = buffer.len(),
                    window = state.window.len(),
                    "Recommendation buffer replaced"
                );

                Ok(Settled::Current(buffer))
            }
            Err(e) => {
                state.requested = None;
                tracing::warn!(source = %source, algorithm = %algorithm, error = %e, "Recommendation fetch failed");
                Err(EngineError::RecommendationUnavailable(e.to_string()))
            }
        }
    }

    /// Grows the window by one page increment
    pub fn load_more(&self) -> DisplayWindow {
        self.load_more_by(self.page_increment)
    }

    pub fn load_more_by(&self, increment: usize) -> DisplayWindow {
        let mut state = self.lock();
        let Some(buffer) = state.current.clone() else {
            return state.window;
        };
        state.window = grow_window(&buffer, state.window, increment);
        tracing::debug!(window = state.window.len(), buffer = buffer.len(), "Display window grown");
        state.window
    }

    pub fn current(&self) -> Option<Arc<RecommendationBuffer>> {
        self.lock().current.clone()
    }

    pub fn window(&self) -> DisplayWindow {
        self.lock().window
    }

    /// Buffer and window read together
    pub fn snapshot(&self) -> Option<(Arc<RecommendationBuffer>, DisplayWindow)> {
        let state = self.lock();
        state.current.clone().map(|buffer| (buffer, state.window))
    }

    /// Drops the held buffer and any response still in flight
    pub fn reset(&self) {
        let mut state = self.lock();
        state.generation += 1;
        state.requested = None;
        state.current = None;
        state.window = DisplayWindow::default();
    }
}
