use crate::image::ImageTensor;
use crate::models::Model;
use crate::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

type LoaderFn = dyn Fn() -> Result<Arc<dyn Model>> + Send + Sync;

/// 模型句柄的加载状态
///
/// `Uninitialized → Loading → Ready`，加载失败时回到 `Uninitialized`。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadState {
    Uninitialized,
    Loading,
    Ready,
}

/// 懒加载的进程级模型句柄
///
/// - 首个调用者在加载锁内完成加载和预热，其余并发调用者阻塞等待，整个进程只加载一次；
/// - `Ready` 之后通过 `OnceCell::get` 无锁读取；
/// - 加载或预热失败返回 `ModelLoad`，状态复位，下一次调用会重新加载。
pub struct ModelHandle {
    loader: Box<LoaderFn>,
    warmup_shape: (usize, usize),
    model: OnceCell<Arc<dyn Model>>,
    state: Mutex<LoadState>,
    load_attempts: AtomicUsize,
}

impl ModelHandle {
    /// `loader` 负责从持久存储构造模型，`warmup_shape` 为 (H, W)
    pub fn new<F, M>(loader: F, warmup_shape: (usize, usize)) -> Self
    where
        F: Fn() -> Result<M> + Send + Sync + 'static,
        M: Model + 'static,
    {
        Self {
            loader: Box::new(move || loader().map(|m| Arc::new(m) as Arc<dyn Model>)),
            warmup_shape,
            model: OnceCell::new(),
            state: Mutex::new(LoadState::Uninitialized),
            load_attempts: AtomicUsize::new(0),
        }
    }

    /// 获取模型，必要时加载
    pub fn get_model(&self) -> Result<Arc<dyn Model>> {
        // 快速路径：已就绪
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        let mut state = self.state.lock();
        // 拿到锁后再次检查，等待期间可能已由其他线程加载完成
        if let Some(model) = self.model.get() {
            return Ok(Arc::clone(model));
        }

        let mut loading = LoadingGuard::enter(&mut state);
        match self.load_and_warm_up() {
            Ok(model) => {
                let model = Arc::clone(self.model.get_or_init(|| model));
                loading.finish();
                Ok(model)
            }
            Err(e) => {
                tracing::error!("Model load failed, handle reset for retry: {}", e);
                Err(e)
            }
        }
    }

    /// 对已就绪的模型执行推理（未就绪时先走加载路径）
    pub fn predict(&self, tensor: &ImageTensor) -> Result<Vec<f32>> {
        let model = self.get_model()?;
        model.predict(tensor)
    }

    pub fn state(&self) -> LoadState {
        if self.model.get().is_some() {
            return LoadState::Ready;
        }
        // 加载锁只在状态迁移期间持有，拿不到锁即表示正在加载
        match self.state.try_lock() {
            Some(state) => *state,
            None => LoadState::Loading,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.model.get().is_some()
    }

    /// 累计加载尝试次数（含失败）
    pub fn load_attempts(&self) -> usize {
        self.load_attempts.load(Ordering::Acquire)
    }

    fn load_and_warm_up(&self) -> Result<Arc<dyn Model>> {
        let attempt = self.load_attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let start = Instant::now();
        tracing::info!("Loading model (attempt {})...", attempt);

        let model = (self.loader)().map_err(|e| e.into_model_load())?;
        let load_time = start.elapsed();

        self.warm_up(model.as_ref())?;

        tracing::info!(
            "Model ready: load={:.3}s, total={:.3}s",
            load_time.as_secs_f32(),
            start.elapsed().as_secs_f32()
        );
        Ok(model)
    }

    /// 预热：用全零张量跑一次推理，让运行时的延迟初始化发生在真实请求之前
    fn warm_up(&self, model: &dyn Model) -> Result<()> {
        let (height, width) = self.warmup_shape;
        let start = Instant::now();

        let output = model
            .predict(&ImageTensor::zeros(height, width))
            .map_err(|e| e.into_model_load())?;

        if output.is_empty() {
            return Err(crate::ClassifierError::ModelLoad(
                "Warm-up inference produced an empty output".to_string(),
            ));
        }

        tracing::debug!(
            "Warm-up inference done: outputs={}, time={:.3}s",
            output.len(),
            start.elapsed().as_secs_f32()
        );
        Ok(())
    }
}

/// 持有 `Loading` 状态；未调用 `finish` 就离开作用域（出错或 panic）时复位为 `Uninitialized`
struct LoadingGuard<'a> {
    state: &'a mut LoadState,
    ready: bool,
}

impl<'a> LoadingGuard<'a> {
    fn enter(state: &'a mut LoadState) -> Self {
        *state = LoadState::Loading;
        Self { state, ready: false }
    }

    fn finish(&mut self) {
        *self.state = LoadState::Ready;
        self.ready = true;
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.ready {
            *self.state = LoadState::Uninitialized;
        }
    }
}

impl std::fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandle")
            .field("state", &self.state())
            .field("warmup_shape", &self.warmup_shape)
            .field("load_attempts", &self.load_attempts())
            .finish()
    }
}
