use crate::Playlist;
use serde_json::Value;
use std::collections::HashSet;

/// Maps any server playlist shape onto [`Playlist`].
///
/// The id comes from `id`, falling back to `playlist_id`; numeric ids are
/// stringified so both spellings of the same playlist compare equal. The
/// track count comes from `tracks` (a number or a `{"total": n}` object),
/// falling back to `track_count`, and defaults to 0. Returns `None` when the
/// value carries no usable id.
pub fn normalize_playlist(value: &Value) -> Option<Playlist> {
    let id = id_field(value.get("id")).or_else(|| id_field(value.get("playlist_id")))?;
    Some(Playlist {
        id,
        name: string_field(value.get("name")),
        image: string_field(value.get("image")),
        tracks: count_field(value.get("tracks"))
            .or_else(|| count_field(value.get("track_count")))
            .unwrap_or(0),
        external_url: string_field(value.get("external_url")),
    })
}

pub fn normalize_playlists(values: &[Value]) -> Vec<Playlist> {
    values.iter().filter_map(normalize_playlist).collect()
}

/// Keeps the first occurrence of every id.
pub fn dedupe(playlists: impl IntoIterator<Item = Playlist>) -> Vec<Playlist> {
    let mut seen = HashSet::new();
    playlists
        .into_iter()
        .filter(|p| seen.insert(p.id.clone()))
        .collect()
}

/// Playlists from `available` whose ids are not in `imported`.
pub fn exclude_imported(available: &[Playlist], imported: &[Playlist]) -> Vec<Playlist> {
    let imported: HashSet<_> = imported.iter().map(|p| p.id.as_str()).collect();
    available
        .iter()
        .filter(|p| !imported.contains(p.id.as_str()))
        .cloned()
        .collect()
}

fn id_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn string_field(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .map(str::to_owned)
        .unwrap_or_default()
}

fn count_field(value: Option<&Value>) -> Option<u64> {
    let count = match value? {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        // Spotify's own shape
        Value::Object(map) => count_field(map.get("total")),
        _ => None,
    };
    // Zero falls through to the next spelling
    count.filter(|count| *count > 0)
}

#[cfg(test)]
mod test {
    use super::{dedupe, exclude_imported, normalize_playlist, normalize_playlists};
    use crate::Playlist;
    use serde_json::json;

    #[test]
    fn test_normalize_equivalent_shapes() {
        let first = normalize_playlist(&json!({"id": 1, "tracks": 5})).unwrap();
        let second = normalize_playlist(&json!({"playlist_id": 1, "track_count": 5})).unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first,
            Playlist {
                id: "1".to_owned(),
                name: String::new(),
                image: String::new(),
                tracks: 5,
                external_url: String::new(),
            }
        );
        assert_eq!(dedupe([first, second]).len(), 1);
    }

    #[test]
    fn test_normalize_defaults() {
        assert_eq!(
            normalize_playlist(&json!({"playlist_id": "abc", "name": "Mix", "image": null})),
            Some(Playlist {
                id: "abc".to_owned(),
                name: "Mix".to_owned(),
                image: String::new(),
                tracks: 0,
                external_url: String::new(),
            })
        );
        assert_eq!(
            normalize_playlist(&json!({"id": "abc", "tracks": {"total": 12}}))
                .unwrap()
                .tracks,
            12
        );
        assert_eq!(
            normalize_playlist(&json!({"id": "abc", "tracks": 0, "track_count": 7}))
                .unwrap()
                .tracks,
            7
        );
        assert_eq!(
            normalize_playlist(&json!({"id": "", "playlist_id": "fallback"}))
                .unwrap()
                .id,
            "fallback"
        );
    }

    #[test]
    fn test_normalize_rejects_missing_id() {
        assert_eq!(normalize_playlist(&json!({"name": "No id"})), None);
        assert_eq!(normalize_playlist(&json!(null)), None);
        assert_eq!(
            normalize_playlists(&[json!({"name": "No id"}), json!({"id": "a"})]).len(),
            1
        );
    }

    #[test]
    fn test_exclude_imported() {
        let available = normalize_playlists(&[
            json!({"id": "a", "tracks": 1}),
            json!({"playlist_id": "b", "track_count": 2}),
            json!({"id": "c"}),
        ]);
        let imported = normalize_playlists(&[json!({"playlist_id": "a"}), json!({"id": "c"})]);
        let remaining = exclude_imported(&available, &imported);
        assert_eq!(
            remaining.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(),
            ["b"]
        );
    }
}
