//! Загрузчик шрифтов: очередь запросов с корреляционными id и
//! конечный автомат перебора источников.
//!
//! Движок однопоточный и никогда не блокируется на сети: запрос
//! уходит в канал, ответ забирается из канала на следующем прогоне
//! [`super::StyleEngine::pump_font_events`]. Сопоставление — по id.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

use super::fonts::{FontCache, FontFace, FontFaceKey, FontFaceSource};

/// Ошибка загрузки шрифта.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FontError {
    #[error("fetch failed for `{url}`: {reason}")]
    Fetch { url: String, reason: String },
    #[error("font decode failed for `{url}`: {reason}")]
    Decode { url: String, reason: String },
    #[error("all sources exhausted for `{family}`")]
    Exhausted { family: String },
}

/// Запрос на загрузку одного URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub id: u64,
    pub url: String,
}

/// Ответ на запрос с тем же id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub id: u64,
    pub result: Result<Vec<u8>, String>,
}

/// Пара каналов запрос/ответ со счётчиком корреляционных id.
#[derive(Debug)]
pub struct FontQueue {
    requests: mpsc::UnboundedSender<FetchRequest>,
    responses: mpsc::UnboundedReceiver<FetchResponse>,
    next_id: u64,
}

impl FontQueue {
    /// Отправляет запрос и возвращает его id.
    pub fn submit(&mut self, url: String) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        if self.requests.send(FetchRequest { id, url }).is_err() {
            tracing::warn!("font fetch task is gone, request {id} dropped");
        }
        id
    }

    /// Неблокирующее чтение готового ответа.
    pub fn try_recv(&mut self) -> Option<FetchResponse> {
        self.responses.try_recv().ok()
    }

    /// Ожидает следующий ответ (для тестов и офлайн-прогонов).
    pub async fn recv(&mut self) -> Option<FetchResponse> {
        self.responses.recv().await
    }
}

/// Сторона, умеющая доставать байты по URL.
pub trait FontFetcher: Send + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, String>> + Send;
}

/// Запускает задачу-исполнитель запросов и возвращает очередь.
pub fn spawn_fetcher<F: FontFetcher>(fetcher: F) -> FontQueue {
    let (request_tx, mut request_rx) = mpsc::unbounded_channel::<FetchRequest>();
    let (response_tx, response_rx) = mpsc::unbounded_channel::<FetchResponse>();

    tokio::spawn(async move {
        while let Some(request) = request_rx.recv().await {
            let result = fetcher.fetch(&request.url).await;
            if response_tx
                .send(FetchResponse { id: request.id, result })
                .is_err()
            {
                break;
            }
        }
    });

    FontQueue {
        requests: request_tx,
        responses: response_rx,
        next_id: 1,
    }
}

/// Боевой загрузчик: http/https через reqwest, file:// через tokio::fs.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl FontFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await.map_err(|e| e.to_string())?;
            if !response.status().is_success() {
                return Err(format!("status {}", response.status()));
            }
            let bytes = response.bytes().await.map_err(|e| e.to_string())?;
            Ok(bytes.to_vec())
        } else {
            let path = url.strip_prefix("file://").unwrap_or(url);
            tokio::fs::read(path).await.map_err(|e| e.to_string())
        }
    }
}

/// Состояние загрузчика одного начертания.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderState {
    Fetching { request_id: u64 },
    Loaded,
    Failed,
}

/// Загрузчик одного начертания: список источников и курсор.
#[derive(Debug)]
struct FontLoader {
    key: FontFaceKey,
    family: String,
    sources: Vec<FontFaceSource>,
    cursor: usize,
    state: LoaderState,
}

impl FontLoader {
    fn current_url(&self) -> Option<&str> {
        match self.sources.get(self.cursor) {
            Some(FontFaceSource::Url { url, .. }) => Some(url),
            _ => None,
        }
    }
}

/// Событие, которое видит движок после обработки ответа.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoaderEvent {
    /// Шрифт декодирован и положен в кеш; стили нужно пересчитать.
    Loaded(FontFaceKey),
    /// Все источники исчерпаны; начертание помечено сломанным.
    Failed(FontFaceKey, FontError),
}

/// Реестр загрузчиков по ключам начертаний.
#[derive(Debug, Default)]
pub struct FontLoaders {
    loaders: HashMap<FontFaceKey, FontLoader>,
    pending: HashMap<u64, FontFaceKey>,
}

impl FontLoaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, key: &FontFaceKey) -> Option<&LoaderState> {
        self.loaders.get(key).map(|loader| &loader.state)
    }

    /// Ставит начертание на загрузку, если оно ещё не в работе.
    pub fn ensure_loading(&mut self, face: &FontFace, queue: &mut FontQueue) {
        let key = face.key();
        if self.loaders.contains_key(&key) {
            return;
        }
        let sources = face.loadable_sources();
        let mut loader = FontLoader {
            key: key.clone(),
            family: face.family.clone(),
            sources,
            cursor: 0,
            state: LoaderState::Failed,
        };
        match loader.current_url() {
            Some(url) => {
                let request_id = queue.submit(url.to_string());
                tracing::debug!(
                    "font `{}` w{} {}: fetching `{url}` (request {request_id})",
                    loader.family,
                    key.weight,
                    key.slope,
                );
                loader.state = LoaderState::Fetching { request_id };
                self.pending.insert(request_id, key.clone());
            }
            None => {
                tracing::warn!("font `{}` has no loadable sources", loader.family);
            }
        }
        self.loaders.insert(key, loader);
    }

    /// Обрабатывает ответ загрузчика; `None` — перешли к следующему
    /// источнику, событие — финальный исход.
    pub fn handle_response(
        &mut self,
        response: FetchResponse,
        cache: &mut FontCache,
        queue: &mut FontQueue,
    ) -> Option<LoaderEvent> {
        let key = self.pending.remove(&response.id)?;
        let loader = self.loaders.get_mut(&key)?;
        let url = loader.current_url().unwrap_or("<unknown>").to_string();

        let failure = match response.result {
            Ok(bytes) => match FontCache::decode(&bytes) {
                Ok(font) => {
                    loader.state = LoaderState::Loaded;
                    cache.insert_loaded(key.clone(), Arc::new(font));
                    tracing::info!("font `{}` loaded from `{url}`", loader.family);
                    return Some(LoaderEvent::Loaded(key));
                }
                Err(reason) => FontError::Decode { url, reason },
            },
            Err(reason) => FontError::Fetch { url, reason },
        };

        tracing::warn!("font source failed: {failure}; trying next source");
        loader.cursor += 1;
        match loader.current_url() {
            Some(next_url) => {
                let request_id = queue.submit(next_url.to_string());
                loader.state = LoaderState::Fetching { request_id };
                self.pending.insert(request_id, key);
                None
            }
            None => {
                loader.state = LoaderState::Failed;
                let error = FontError::Exhausted { family: loader.family.clone() };
                tracing::warn!("{error}");
                Some(LoaderEvent::Failed(key, error))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::style::fonts::FontSlope;
    use std::collections::HashMap;

    /// Фетчер с заранее заданными ответами.
    struct StubFetcher {
        responses: HashMap<String, Result<Vec<u8>, String>>,
    }

    impl FontFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<Vec<u8>, String> {
            self.responses
                .get(url)
                .cloned()
                .unwrap_or_else(|| Err("not found".to_string()))
        }
    }

    fn face_with_sources(urls: &[&str]) -> FontFace {
        let mut face = FontFace::new("Demo".to_string());
        for url in urls {
            face.sources.push(FontFaceSource::Url { url: url.to_string(), format: None });
        }
        face
    }

    #[tokio::test]
    async fn test_advances_to_next_source_on_fetch_failure() {
        let mut responses = HashMap::new();
        responses.insert("a.ttf".to_string(), Err("timeout".to_string()));
        // Байты придут, но декодирование провалится, это третий шаг.
        responses.insert("b.ttf".to_string(), Ok(vec![0u8; 16]));
        let mut queue = spawn_fetcher(StubFetcher { responses });

        let mut loaders = FontLoaders::new();
        let mut cache = FontCache::new();
        let face = face_with_sources(&["a.ttf", "b.ttf"]);
        loaders.ensure_loading(&face, &mut queue);

        // Первый ответ: fetch-ошибка, курсор двигается дальше.
        let first = queue.recv().await.unwrap();
        assert!(loaders.handle_response(first, &mut cache, &mut queue).is_none());
        assert!(matches!(
            loaders.state(&face.key()),
            Some(LoaderState::Fetching { .. })
        ));

        // Второй ответ: мусорные байты, источники исчерпаны.
        let second = queue.recv().await.unwrap();
        let event = loaders.handle_response(second, &mut cache, &mut queue).unwrap();
        assert!(matches!(event, LoaderEvent::Failed(_, FontError::Exhausted { .. })));
        assert_eq!(loaders.state(&face.key()), Some(&LoaderState::Failed));
        assert!(!cache.is_loaded(&face.key()));
    }

    #[tokio::test]
    async fn test_correlation_ids_are_unique_and_routed() {
        let mut responses = HashMap::new();
        responses.insert("x.ttf".to_string(), Err("nope".to_string()));
        responses.insert("y.ttf".to_string(), Err("nope".to_string()));
        let mut queue = spawn_fetcher(StubFetcher { responses });

        let mut loaders = FontLoaders::new();
        let mut cache = FontCache::new();
        let mut face_x = face_with_sources(&["x.ttf"]);
        face_x.weight = 400;
        let mut face_y = face_with_sources(&["y.ttf"]);
        face_y.weight = 700;
        loaders.ensure_loading(&face_x, &mut queue);
        loaders.ensure_loading(&face_y, &mut queue);

        let mut failed = Vec::new();
        for _ in 0..2 {
            let response = queue.recv().await.unwrap();
            if let Some(LoaderEvent::Failed(key, _)) =
                loaders.handle_response(response, &mut cache, &mut queue)
            {
                failed.push(key);
            }
        }
        assert_eq!(failed.len(), 2);
        assert!(failed.contains(&FontFaceKey::new("Demo", 400, FontSlope::Normal)));
        assert!(failed.contains(&FontFaceKey::new("Demo", 700, FontSlope::Normal)));
    }

    #[tokio::test]
    async fn test_ensure_loading_is_idempotent() {
        let mut queue = spawn_fetcher(StubFetcher { responses: HashMap::new() });
        let mut loaders = FontLoaders::new();
        let face = face_with_sources(&["a.ttf"]);
        loaders.ensure_loading(&face, &mut queue);
        loaders.ensure_loading(&face, &mut queue);
        // Один запрос в полёте, второго submit не было.
        assert_eq!(loaders.pending.len(), 1);
    }
}
