use crate::{
    error::{EngineError, EngineResult},
    models::{Identity, InteractionState, ItemId},
    services::providers::{FavoritesProvider, IdentityProvider},
};
use serde::Serialize;
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, PoisonError,
    },
};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

pub const MAX_RATING: u8 = 5;

type Token = u64;

/// Change notification for every renderer of an item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InteractionEvent {
    /// Visible state changed, optimistically or from confirmed data
    Changed { item: ItemId, state: InteractionState },
    /// A failed write reverted the visible state
    RolledBack { item: ItemId, state: InteractionState },
}

impl InteractionEvent {
    pub fn item(&self) -> ItemId {
        match self {
            InteractionEvent::Changed { item, .. } | InteractionEvent::RolledBack { item, .. } => *item,
        }
    }

    pub fn state(&self) -> InteractionState {
        match self {
            InteractionEvent::Changed { state, .. } | InteractionEvent::RolledBack { state, .. } => *state,
        }
    }
}

/// One optimistically updated field
///
/// Invariant: when no mutation is pending (`latest` is `None`) the visible value equals the
/// last confirmed value. Otherwise it is the value written by the newest unsettled mutation.
#[derive(Debug, Clone)]
struct Tracked<T> {
    value: T,
    confirmed: T,
    confirmed_by: Option<Token>,
    latest: Option<Token>,
    in_flight: BTreeMap<Token, T>,
}

impl<T: Copy + PartialEq> Tracked<T> {
    fn new(value: T) -> Self {
        Self {
            value,
            confirmed: value,
            confirmed_by: None,
            latest: None,
            in_flight: BTreeMap::new(),
        }
    }

    fn begin(&mut self, token: Token, value: T) {
        self.in_flight.insert(token, value);
        self.value = value;
        self.latest = Some(token);
    }

    fn confirm(&mut self, token: Token) {
        let Some(value) = self.in_flight.remove(&token) else {
            return;
        };

        if self.confirmed_by.is_none_or(|by| by < token) {
            self.confirmed = value;
            self.confirmed_by = Some(token);
            // Older writes can no longer decide the visible value
            self.in_flight.retain(|&other, _| other > token);
        }

        if self.latest == Some(token) {
            self.latest = None;
            self.value = self.confirmed;
        }
    }

    /// Reverts a failed mutation; returns the restored value if the visible value changed
    fn fail(&mut self, token: Token) -> Option<T> {
        let failed = self.in_flight.remove(&token)?;

        if self.latest != Some(token) {
            return None;
        }

        match self.in_flight.last_key_value() {
            Some((&newest, &value)) => {
                self.value = value;
                self.latest = Some(newest);
            }
            None => {
                self.value = self.confirmed;
                self.latest = None;
            }
        }

        (self.value != failed).then_some(self.value)
    }

    /// Installs a backend-confirmed value; a pending mutation keeps its optimistic value
    fn seed(&mut self, value: T) -> bool {
        self.confirmed = value;
        if self.latest.is_none() && self.value != value {
            self.value = value;
            return true;
        }
        false
    }

    fn is_pending(&self) -> bool {
        self.latest.is_some()
    }
}

#[derive(Debug, Clone)]
struct ItemEntry {
    liked: Tracked<bool>,
    rating: Tracked<u8>,
}

impl Default for ItemEntry {
    fn default() -> Self {
        Self {
            liked: Tracked::new(false),
            rating: Tracked::new(0),
        }
    }
}

impl ItemEntry {
    fn state(&self) -> InteractionState {
        InteractionState {
            liked: self.liked.value,
            rating: self.rating.value,
        }
    }
}

/// Single source of like and rating state for every rendering of an item
///
/// Mutations apply locally before the write is issued. Each field of each item keeps a
/// rollback value per in-flight write, so a failing write only reverts the visible value if
/// no newer mutation of that field has superseded it. The item map is locked only for
/// synchronous updates, never across a write.
pub struct InteractionStateStore {
    favorites: Arc<dyn FavoritesProvider>,
    identity: Arc<dyn IdentityProvider>,
    items: Mutex<HashMap<ItemId, ItemEntry>>,
    next_token: AtomicU64,
    events: broadcast::Sender<InteractionEvent>,
}

impl InteractionStateStore {
    pub fn new(favorites: Arc<dyn FavoritesProvider>, identity: Arc<dyn IdentityProvider>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            favorites,
            identity,
            items: Mutex::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            events,
        }
    }

    /// Current, possibly unconfirmed, state of `item`
    pub fn get_state(&self, item: ItemId) -> InteractionState {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item)
            .map(ItemEntry::state)
            .unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InteractionEvent> {
        self.events.subscribe()
    }

    /// Whether a write for `item` is still awaiting its outcome
    pub fn is_pending(&self, item: ItemId) -> bool {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&item)
            .is_some_and(|entry| entry.liked.is_pending() || entry.rating.is_pending())
    }

    pub async fn set_liked(&self, item: ItemId, liked: bool) -> EngineResult<()> {
        let identity = self.require_identity(item)?;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);

        let state = self.update(item, |entry| entry.liked.begin(token, liked));
        self.publish(InteractionEvent::Changed { item, state });

        let result = if liked {
            self.favorites.like(&identity, item).await
        } else {
            self.favorites.unlike(&identity, item).await
        };

        match result {
            Ok(()) => {
                self.update(item, |entry| entry.liked.confirm(token));
                tracing::info!(item = %item, liked, "Like confirmed");
                Ok(())
            }
            Err(e) => {
                let mut rolled_back = None;
                let state = self.update(item, |entry| rolled_back = entry.liked.fail(token));
                if rolled_back.is_some() {
                    self.publish(InteractionEvent::RolledBack { item, state });
                }
                tracing::warn!(item = %item, liked, error = %e, rolled_back = rolled_back.is_some(), "Like update failed");
                Err(EngineError::LikeUpdateFailed {
                    item,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Flips the liked state of `item`, returning the new optimistic value
    pub async fn toggle_liked(&self, item: ItemId) -> EngineResult<bool> {
        let liked = !self.get_state(item).liked;
        self.set_liked(item, liked).await?;
        Ok(liked)
    }

    pub async fn set_rating(&self, item: ItemId, rating: u8) -> EngineResult<()> {
        if rating > MAX_RATING {
            return Err(EngineError::InvalidRating(rating));
        }
        let identity = self.require_identity(item)?;
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);

        let state = self.update(item, |entry| entry.rating.begin(token, rating));
        self.publish(InteractionEvent::Changed { item, state });

        match self.favorites.rate(&identity, item, rating).await {
            Ok(()) => {
                self.update(item, |entry| entry.rating.confirm(token));
                tracing::info!(item = %item, rating, "Rating confirmed");
                Ok(())
            }
            Err(e) => {
                let mut rolled_back = None;
                let state = self.update(item, |entry| rolled_back = entry.rating.fail(token));
                if rolled_back.is_some() {
                    self.publish(InteractionEvent::RolledBack { item, state });
                }
                tracing::warn!(item = %item, rating, error = %e, rolled_back = rolled_back.is_some(), "Rating update failed");
                Err(EngineError::RatingUpdateFailed {
                    item,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Installs confirmed state for `item` received from elsewhere
    pub fn seed(&self, item: ItemId, state: InteractionState) {
        let mut changed = false;
        let visible = self.update(item, |entry| {
            changed |= entry.liked.seed(state.liked);
            changed |= entry.rating.seed(state.rating);
        });
        if changed {
            self.publish(InteractionEvent::Changed { item, state: visible });
        }
    }

    /// Reloads the identity's favorites and marks exactly those items as confirmed liked
    pub async fn refresh_favorites(&self) -> EngineResult<Vec<ItemId>> {
        let identity = self
            .identity
            .current()
            .ok_or(EngineError::AuthenticationRequired)?;

        let favorites = self
            .favorites
            .favorites(&identity)
            .await
            .map_err(|e| {
                tracing::warn!(user_id = %identity.user_id, error = %e, "Favorites refresh failed");
                EngineError::FavoritesUnavailable(e.to_string())
            })?;

        let liked: HashSet<ItemId> = favorites.iter().map(|f| f.id).collect();
        let mut changed = Vec::new();
        {
            let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
            for id in &liked {
                items.entry(*id).or_default();
            }
            for (id, entry) in items.iter_mut() {
                if entry.liked.seed(liked.contains(id)) {
                    changed.push((*id, entry.state()));
                }
            }
        }

        for (item, state) in changed {
            self.publish(InteractionEvent::Changed { item, state });
        }

        let mut ids: Vec<ItemId> = liked.into_iter().collect();
        ids.sort();
        tracing::info!(user_id = %identity.user_id, favorites = ids.len(), "Favorites refreshed");
        Ok(ids)
    }

    fn require_identity(&self, item: ItemId) -> EngineResult<Identity> {
        self.identity.current().ok_or_else(|| {
            tracing::debug!(item = %item, "Interaction rejected without identity");
            EngineError::AuthenticationRequired
        })
    }

    fn update(&self, item: ItemId, apply: impl FnOnce(&mut ItemEntry)) -> InteractionState {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = items.entry(item).or_default();
        apply(entry);
        entry.state()
    }

    fn publish(&self, event: InteractionEvent) {
        // No receivers is fine
        let _ = self.events.send(event);
    }
}
