use std::time::{Duration, Instant};

use easel_core::{Dimension, Element, ElementId, ElementKind, Filter, Size};
use lru::LruCache;
use serde::{Deserialize, Serialize};

use crate::render_data::EstimateSize;

/// Items larger than this share of the memory budget are never stored.
const MAX_ITEM_SHARE: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,
    pub max_items: usize,
    pub max_memory_bytes: usize,
    /// Entries older than this are rebuilt on next access.
    pub ttl_seconds: Option<f64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_items: 1000,
            max_memory_bytes: 50 * 1024 * 1024,
            ttl_seconds: None,
        }
    }
}

/// Key over element identity and the attributes that change its appearance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey(pub u64);

impl CacheKey {
    pub fn for_element(element: &Element, size: Size) -> Self {
        let style = &element.style;
        let mut h = Fnv1a64::new(0xcbf2_9ce4_8422_2325);
        h.write_bytes(element.id.as_bytes());
        h.write_u8(element.kind.tag());
        write_dimension(&mut h, element.width);
        write_dimension(&mut h, element.height);
        h.write_f64(size.width);
        h.write_f64(size.height);
        match style.background {
            Some(c) => h.write_bytes(&[1, c.r, c.g, c.b, c.a]),
            None => h.write_u8(0),
        }
        match style.border {
            Some(b) => {
                h.write_f64(b.width);
                h.write_bytes(&[b.color.r, b.color.g, b.color.b, b.color.a]);
            }
            None => h.write_u8(0),
        }
        h.write_f64(style.corner_radius);
        h.write_f64(style.opacity);
        h.write_f64(style.rotation);
        h.write_f64(style.scale);
        h.write_u8(u8::from(style.shadow.is_some()));
        let t = style.text_color;
        h.write_bytes(&[t.r, t.g, t.b, t.a]);
        CacheKey(h.finish())
    }
}

/// Hash over everything that feeds the visual, including kind payloads that
/// the key leaves out.
pub fn content_hash(element: &Element, size: Size) -> u64 {
    let style = &element.style;
    let mut h = Fnv1a64::new(0x9ae1_6a3b_2f90_404f);
    h.write_u64(CacheKey::for_element(element, size).0);
    h.write_str(&element.name);
    match &element.kind {
        ElementKind::Text { content, font_size } => {
            h.write_str(content);
            h.write_f64(*font_size);
        }
        ElementKind::Image { source } | ElementKind::Video { source } => h.write_str(source),
        ElementKind::Control { control } => h.write_u8(*control as u8),
        ElementKind::Shape { shape } => h.write_u8(*shape as u8),
        ElementKind::Container | ElementKind::Canvas | ElementKind::Grid | ElementKind::Overlay => {}
    }
    if let Some(s) = style.shadow {
        h.write_f64(s.offset_x);
        h.write_f64(s.offset_y);
        h.write_f64(s.blur);
        h.write_bytes(&[s.color.r, s.color.g, s.color.b, s.color.a]);
    }
    h.write_u64(style.filters.len() as u64);
    for filter in &style.filters {
        let (tag, amount) = match filter {
            Filter::Blur(v) => (0, v),
            Filter::Grayscale(v) => (1, v),
            Filter::Brightness(v) => (2, v),
        };
        h.write_u8(tag);
        h.write_f64(*amount);
    }
    h.finish()
}

fn write_dimension(h: &mut Fnv1a64, d: Dimension) {
    match d {
        Dimension::Px(v) => {
            h.write_u8(0);
            h.write_f64(v);
        }
        Dimension::Percent(v) => {
            h.write_u8(1);
            h.write_f64(v);
        }
        Dimension::Auto => h.write_u8(2),
    }
}

struct Fnv1a64 {
    state: u64,
}

impl Fnv1a64 {
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for b in bytes {
            self.state ^= u64::from(*b);
            self.state = self.state.wrapping_mul(Self::PRIME);
        }
    }

    fn write_u8(&mut self, v: u8) {
        self.write_bytes(&[v]);
    }

    fn write_u64(&mut self, v: u64) {
        self.write_bytes(&v.to_le_bytes());
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_str(&mut self, s: &str) {
        self.write_u64(s.len() as u64);
        self.write_bytes(s.as_bytes());
    }

    fn finish(&self) -> u64 {
        self.state
    }
}

/// A stored render result.
#[derive(Debug, Clone)]
pub struct CachedRender<T> {
    pub output: T,
    pub content_hash: u64,
    pub element: ElementId,
    pub created_at: Instant,
    pub render_time: Duration,
    pub size_bytes: usize,
    pub access_count: u64,
    pub last_access: Instant,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
    /// Items too large to store.
    pub rejections: u64,
    /// Entries dropped because their content hash no longer matched.
    pub stale_refreshes: u64,
    pub entries: usize,
    pub memory_bytes: usize,
    pub peak_memory_bytes: usize,
    /// Render time avoided by serving hits.
    pub time_saved: Duration,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

enum Lookup<T> {
    Hit(T),
    Expired,
    Stale,
    Absent,
}

/// Content-keyed LRU store of rendered visuals, bounded by count and bytes.
pub struct RenderCache<T> {
    config: CacheConfig,
    ttl: Option<Duration>,
    entries: LruCache<CacheKey, CachedRender<T>>,
    memory_bytes: usize,
    stats: CacheStats,
}

impl<T: Clone + EstimateSize> RenderCache<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            ttl: config
                .ttl_seconds
                .and_then(|s| Duration::try_from_secs_f64(s).ok()),
            config,
            entries: LruCache::unbounded(),
            memory_bytes: 0,
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Return the cached output for `element`, rendering and storing on a miss.
    ///
    /// The flag is `true` when the output came from the cache. `force` skips
    /// the lookup and replaces any existing entry.
    pub fn get_or_render<F>(
        &mut self,
        element: &Element,
        size: Size,
        force: bool,
        render_fn: F,
    ) -> (T, bool)
    where
        F: FnOnce(&Element) -> T,
    {
        if !self.config.enabled {
            self.stats.misses += 1;
            return (render_fn(element), false);
        }

        let key = CacheKey::for_element(element, size);
        let hash = content_hash(element, size);

        if force {
            self.remove_entry(&key);
        } else {
            match self.lookup(&key, hash) {
                Lookup::Hit(output) => return (output, true),
                Lookup::Expired => {
                    self.remove_entry(&key);
                    self.stats.expirations += 1;
                }
                Lookup::Stale => {
                    self.remove_entry(&key);
                    self.stats.stale_refreshes += 1;
                }
                Lookup::Absent => {}
            }
        }

        self.stats.misses += 1;
        let started = Instant::now();
        let output = render_fn(element);
        let render_time = started.elapsed();
        let size_bytes = output.estimated_bytes();

        if size_bytes > self.config.max_memory_bytes / MAX_ITEM_SHARE {
            self.stats.rejections += 1;
            log::trace!("Not caching {}: {} bytes over item limit", element.id, size_bytes);
            return (output, false);
        }

        let now = Instant::now();
        self.entries.put(
            key,
            CachedRender {
                output: output.clone(),
                content_hash: hash,
                element: element.id,
                created_at: now,
                render_time,
                size_bytes,
                access_count: 0,
                last_access: now,
            },
        );
        self.memory_bytes += size_bytes;
        self.evict_to_limits();
        self.stats.peak_memory_bytes = self.stats.peak_memory_bytes.max(self.memory_bytes);
        (output, false)
    }

    fn lookup(&mut self, key: &CacheKey, hash: u64) -> Lookup<T> {
        let ttl = self.ttl;
        let Some(entry) = self.entries.get_mut(key) else {
            return Lookup::Absent;
        };
        if ttl.is_some_and(|ttl| entry.created_at.elapsed() > ttl) {
            return Lookup::Expired;
        }
        if entry.content_hash != hash {
            return Lookup::Stale;
        }
        entry.access_count += 1;
        entry.last_access = Instant::now();
        self.stats.hits += 1;
        self.stats.time_saved += entry.render_time;
        Lookup::Hit(entry.output.clone())
    }

    fn remove_entry(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(entry) => {
                self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes);
                true
            }
            None => false,
        }
    }

    fn evict_to_limits(&mut self) {
        while self.entries.len() > self.config.max_items
            || self.memory_bytes > self.config.max_memory_bytes
        {
            let Some((key, entry)) = self.entries.pop_lru() else {
                break;
            };
            self.memory_bytes = self.memory_bytes.saturating_sub(entry.size_bytes);
            self.stats.evictions += 1;
            log::trace!("Evicted cache entry {:?} ({} bytes)", key, entry.size_bytes);
        }
    }

    /// Drop every entry produced for `id`. Returns how many were removed.
    pub fn invalidate(&mut self, id: &ElementId) -> usize {
        let keys: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.element == *id)
            .map(|(key, _)| *key)
            .collect();
        for key in &keys {
            self.remove_entry(key);
        }
        keys.len()
    }

    /// Remove all entries older than the TTL. Returns how many were removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.created_at.elapsed() > ttl)
            .map(|(key, _)| *key)
            .collect();
        for key in &expired {
            self.remove_entry(key);
        }
        self.stats.expirations += expired.len() as u64;
        expired.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.memory_bytes = 0;
    }

    pub fn contains(&self, element: &Element, size: Size) -> bool {
        self.entries.contains(&CacheKey::for_element(element, size))
    }

    /// Peek at an entry without touching its recency.
    pub fn peek(&self, key: &CacheKey) -> Option<&CachedRender<T>> {
        self.entries.peek(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn memory_usage(&self) -> usize {
        self.memory_bytes
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            memory_bytes: self.memory_bytes,
            ..self.stats.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_data::Visual;
    use crate::visual::build_visual;
    use easel_core::{Color, Rect, Style};

    const SIZE: Size = Size {
        width: 100.0,
        height: 50.0,
    };

    #[derive(Debug, Clone, PartialEq)]
    struct Blob(usize);

    impl EstimateSize for Blob {
        fn estimated_bytes(&self) -> usize {
            self.0
        }
    }

    fn config(max_items: usize, max_memory_bytes: usize) -> CacheConfig {
        CacheConfig {
            enabled: true,
            max_items,
            max_memory_bytes,
            ttl_seconds: None,
        }
    }

    fn text(content: &str) -> Element {
        Element::new("t", ElementKind::text(content))
    }

    #[test]
    fn test_idempotent_hit() {
        let mut cache: RenderCache<Visual> = RenderCache::new(CacheConfig::default());
        let el = text("hello");
        let (first, cached) = cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        assert!(!cached);
        let (second, cached) = cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        assert!(cached);
        assert_eq!(first, second);

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert!((stats.hit_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_strict_lru_eviction() {
        let mut cache = RenderCache::new(config(2, 1_000_000));
        let a = text("a");
        let b = text("b");
        let c = text("c");
        for el in [&a, &b, &c] {
            cache.get_or_render(el, SIZE, false, |_| Blob(10));
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&a, SIZE));
        assert!(cache.contains(&b, SIZE));
        assert!(cache.contains(&c, SIZE));
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_access_protects_from_eviction() {
        let mut cache = RenderCache::new(config(2, 1_000_000));
        let a = text("a");
        let b = text("b");
        let c = text("c");
        cache.get_or_render(&a, SIZE, false, |_| Blob(10));
        cache.get_or_render(&b, SIZE, false, |_| Blob(10));
        cache.get_or_render(&a, SIZE, false, |_| Blob(10));
        cache.get_or_render(&c, SIZE, false, |_| Blob(10));
        assert!(cache.contains(&a, SIZE));
        assert!(!cache.contains(&b, SIZE));
    }

    #[test]
    fn test_memory_bound() {
        let mut cache = RenderCache::new(config(100, 1000));
        for i in 0..50 {
            let el = text(&format!("item {}", i));
            cache.get_or_render(&el, SIZE, false, |_| Blob(30 + i));
            assert!(cache.memory_usage() <= 1000);
            assert!(cache.len() <= 100);
        }
        assert!(cache.stats().peak_memory_bytes <= 1000);
        assert!(cache.stats().evictions > 0);
    }

    #[test]
    fn test_peak_tracks_held_bytes() {
        let mut cache = RenderCache::new(config(2, 10_000));
        let a = text("a");
        let b = text("b");
        let c = text("c");
        cache.get_or_render(&a, SIZE, false, |_| Blob(100));
        cache.get_or_render(&b, SIZE, false, |_| Blob(100));
        cache.get_or_render(&c, SIZE, false, |_| Blob(100));
        let stats = cache.stats();
        assert_eq!(stats.memory_bytes, 200);
        assert_eq!(stats.peak_memory_bytes, 200);
    }

    #[test]
    fn test_oversized_items_pass_through() {
        let mut cache = RenderCache::new(config(10, 1000));
        let el = text("big");
        let (out, cached) = cache.get_or_render(&el, SIZE, false, |_| Blob(101));
        assert_eq!(out, Blob(101));
        assert!(!cached);
        assert!(cache.is_empty());
        let (_, cached) = cache.get_or_render(&el, SIZE, false, |_| Blob(101));
        assert!(!cached);
        assert_eq!(cache.stats().rejections, 2);
    }

    #[test]
    fn test_appearance_change_misses() {
        let mut cache: RenderCache<Visual> = RenderCache::new(CacheConfig::default());
        let mut el = Element::new("box", ElementKind::Container);
        cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));

        // Unrelated editor state does not affect the key.
        el.flags.hovered = true;
        el.z_index = 9;
        let (_, cached) = cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        assert!(cached);

        el.style = Style {
            background: Some(Color::rgb(255, 0, 0)),
            ..Style::default()
        };
        let (_, cached) = cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        assert!(!cached);
    }

    #[test]
    fn test_content_hash_catches_text_edit() {
        let mut cache: RenderCache<Visual> = RenderCache::new(CacheConfig::default());
        let mut el = text("before");
        cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        el.kind = ElementKind::text("after");
        let (out, cached) = cache.get_or_render(&el, SIZE, false, |e| build_visual(e, SIZE));
        assert!(!cached);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().stale_refreshes, 1);
        assert!(matches!(out, Visual::Group { ref children, .. }
            if matches!(&children[0], Visual::Text { content, .. } if content == "after")));
    }

    #[test]
    fn test_force_rerenders() {
        let mut cache = RenderCache::new(config(10, 10_000));
        let el = text("x");
        cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        let (out, cached) = cache.get_or_render(&el, SIZE, true, |_| Blob(2));
        assert!(!cached);
        assert_eq!(out, Blob(2));
        let (out, cached) = cache.get_or_render(&el, SIZE, false, |_| Blob(3));
        assert!(cached);
        assert_eq!(out, Blob(2));
        assert_eq!(cache.memory_usage(), 2);
    }

    #[test]
    fn test_ttl_expiry_is_lazy() {
        let mut cache = RenderCache::new(CacheConfig {
            ttl_seconds: Some(0.01),
            ..config(10, 10_000)
        });
        let el = text("x");
        cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.len(), 1);
        let (_, cached) = cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        assert!(!cached);
        assert_eq!(cache.stats().expirations, 1);

        std::thread::sleep(Duration::from_millis(30));
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_invalidate_by_element() {
        let mut cache = RenderCache::new(config(10, 10_000));
        let el = text("x");
        let other = text("y");
        cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        cache.get_or_render(&el, Size::new(5.0, 5.0), false, |_| Blob(1));
        cache.get_or_render(&other, SIZE, false, |_| Blob(1));
        assert_eq!(cache.invalidate(&el.id), 2);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.memory_usage(), 1);
    }

    #[test]
    fn test_disabled_cache_always_renders() {
        let mut cache = RenderCache::new(CacheConfig {
            enabled: false,
            ..CacheConfig::default()
        });
        let el = text("x");
        cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        let (_, cached) = cache.get_or_render(&el, SIZE, false, |_| Blob(1));
        assert!(!cached);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_key_ignores_position() {
        let a = Element::new("a", ElementKind::Container).with_frame(0.0, 0.0, 10.0, 10.0);
        let mut moved = a.clone();
        moved.x = Dimension::Px(500.0);
        let size = Rect::new(0.0, 0.0, 10.0, 10.0).size();
        assert_eq!(CacheKey::for_element(&a, size), CacheKey::for_element(&moved, size));
    }
}
