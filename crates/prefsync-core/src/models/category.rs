//! Preference categories and the merge policy each one uses

/// Top-level key of a preference bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreferenceCategory {
    UserSettings,
    Watchlist,
    SearchHistory,
    GameProgress,
    LikedMovies,
    DislikedMovies,
    /// Any key this engine does not recognize
    Other,
}

/// Record type merged by the entity-keyed primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// `userSettings.content_preferences[]`
    ContentPreference,
    /// `watchlist[]`
    WatchlistItem,
    /// `searchHistory[]`
    SearchHistoryItem,
}

/// How a category is reconciled against the stored bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePolicy {
    /// Coarse `updated_at` last-write-wins with an entity merge of
    /// `content_preferences` when the stored side wins.
    Settings,
    /// Per-record freshness comparison keyed by identity fields.
    EntityKeyed(EntityKind),
    /// Per-key shallow overlay in arrival order. No timestamp is consulted:
    /// the newest request wins every key it carries.
    ArrivalOrderOverlay,
    /// Incoming value replaces the stored one.
    Replace,
}

impl PreferenceCategory {
    pub fn from_key(key: &str) -> Self {
        match key {
            "userSettings" => Self::UserSettings,
            "watchlist" => Self::Watchlist,
            "searchHistory" => Self::SearchHistory,
            "gameProgress" => Self::GameProgress,
            "likedMovies" => Self::LikedMovies,
            "dislikedMovies" => Self::DislikedMovies,
            _ => Self::Other,
        }
    }

    pub const fn merge_policy(self) -> MergePolicy {
        match self {
            Self::UserSettings => MergePolicy::Settings,
            Self::Watchlist => MergePolicy::EntityKeyed(EntityKind::WatchlistItem),
            Self::SearchHistory => MergePolicy::EntityKeyed(EntityKind::SearchHistoryItem),
            Self::GameProgress => MergePolicy::ArrivalOrderOverlay,
            Self::LikedMovies | Self::DislikedMovies | Self::Other => MergePolicy::Replace,
        }
    }
}

impl EntityKind {
    /// Fields whose JSON values together identify one record.
    pub const fn key_fields(self) -> &'static [&'static str] {
        match self {
            Self::ContentPreference | Self::WatchlistItem => &["media_id", "media_type"],
            Self::SearchHistoryItem => &["query"],
        }
    }

    /// Timestamp field compared to decide which copy of a record wins.
    pub const fn freshness_field(self) -> &'static str {
        match self {
            Self::ContentPreference => "timestamp",
            Self::WatchlistItem => "updated_at",
            Self::SearchHistoryItem => "searched_at",
        }
    }

    /// Whether the merged list is cut to the search history limit.
    pub const fn is_bounded(self) -> bool {
        matches!(self, Self::SearchHistoryItem)
    }
}
