use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tumor_classifier::image::{ImagePreprocessor, ImageTensor};
use tumor_classifier::models::LoadState;
use tumor_classifier::{ClassLabels, Classifier, ClassifierError, Model, ModelHandle, Result};

const INPUT_SIZE: u32 = 32;

/// 从文本文件读取"权重"（一行逗号分隔的概率）的测试模型
struct FileModel {
    probabilities: Vec<f32>,
}

impl FileModel {
    fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let probabilities = text
            .trim()
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| ClassifierError::ModelLoad(format!("corrupt model file: {}", e)))?;
        Ok(Self { probabilities })
    }
}

impl Model for FileModel {
    fn predict(&self, input: &ImageTensor) -> Result<Vec<f32>> {
        assert_eq!(input.shape(), &[1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3]);
        Ok(self.probabilities.clone())
    }
}

fn temp_model_path() -> PathBuf {
    std::env::temp_dir().join(format!("tumor-model-{}.txt", uuid::Uuid::new_v4()))
}

fn file_handle(path: PathBuf, loads: Arc<AtomicUsize>) -> ModelHandle {
    let side = INPUT_SIZE as usize;
    ModelHandle::new(
        move || {
            loads.fetch_add(1, Ordering::SeqCst);
            FileModel::load(&path)
        },
        (side, side),
    )
}

fn classifier(handle: ModelHandle, labels: ClassLabels) -> Classifier {
    Classifier::new(ImagePreprocessor::new(INPUT_SIZE), Arc::new(handle), labels)
}

fn sample_png() -> Vec<u8> {
    let mut img = RgbImage::new(64, 48);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        *pixel = Rgb([(x * 4) as u8, (y * 5) as u8, 90]);
    }
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

struct SlowModel;

impl Model for SlowModel {
    fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
        Ok(vec![0.4, 0.3, 0.2, 0.1])
    }
}

#[test]
fn concurrent_first_requests_load_exactly_once() {
    const THREADS: usize = 16;

    let loads = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&loads);
    let handle = Arc::new(ModelHandle::new(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(100));
            Ok(SlowModel)
        },
        (8, 8),
    ));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let handle = Arc::clone(&handle);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                handle.get_model()
            })
        })
        .collect();

    let models: Vec<Arc<dyn Model>> = workers
        .into_iter()
        .map(|w| w.join().unwrap().unwrap())
        .collect();

    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert_eq!(handle.load_attempts(), 1);
    assert_eq!(handle.state(), LoadState::Ready);
    for model in &models[1..] {
        assert!(Arc::ptr_eq(&models[0], model));
    }
}

#[test]
fn state_reports_loading_while_first_load_runs() {
    let release = Arc::new(Barrier::new(2));
    let gate = Arc::clone(&release);
    let handle = Arc::new(ModelHandle::new(
        move || {
            gate.wait();
            thread::sleep(Duration::from_millis(50));
            Ok(SlowModel)
        },
        (8, 8),
    ));

    let loader = {
        let handle = Arc::clone(&handle);
        thread::spawn(move || handle.get_model().map(|_| ()))
    };

    // 加载线程已进入 loader，此时持有加载锁
    release.wait();
    assert_eq!(handle.state(), LoadState::Loading);

    loader.join().unwrap().unwrap();
    assert_eq!(handle.state(), LoadState::Ready);
}

#[test]
fn missing_model_fails_then_recovers_after_restore() {
    let path = temp_model_path();
    let loads = Arc::new(AtomicUsize::new(0));
    let classifier = classifier(
        file_handle(path.clone(), Arc::clone(&loads)),
        ClassLabels::default(),
    );
    let image = sample_png();

    let err = classifier.classify(&image).unwrap_err();
    assert!(matches!(err, ClassifierError::ModelLoad(_)), "got {err:?}");
    assert!(!err.is_client_error());
    assert_eq!(classifier.model().state(), LoadState::Uninitialized);

    std::fs::write(&path, "0.1, 0.1, 0.7, 0.1").unwrap();
    let result = classifier.classify(&image).unwrap();
    assert_eq!(result.predicted_label, "notumor");
    assert_eq!(loads.load(Ordering::SeqCst), 2);

    // 就绪后删除文件不影响已加载的模型
    std::fs::remove_file(&path).unwrap();
    assert!(classifier.classify(&image).is_ok());
    assert_eq!(loads.load(Ordering::SeqCst), 2);
}

#[test]
fn corrupt_model_fails_then_recovers() {
    let path = temp_model_path();
    std::fs::write(&path, "not,a,model").unwrap();
    let classifier = classifier(
        file_handle(path.clone(), Arc::default()),
        ClassLabels::default(),
    );
    let image = sample_png();

    assert!(matches!(
        classifier.classify(&image),
        Err(ClassifierError::ModelLoad(_))
    ));

    std::fs::write(&path, "0.6,0.2,0.1,0.1").unwrap();
    let result = classifier.classify(&image).unwrap();
    assert_eq!(result.predicted_label, "glioma");

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn distribution_is_valid_and_ordered() {
    let path = temp_model_path();
    std::fs::write(&path, "0.1,0.7,0.1,0.1").unwrap();
    let classifier = classifier(file_handle(path.clone(), Arc::default()), ClassLabels::default());

    let result = classifier.classify(&sample_png()).unwrap();

    assert_eq!(result.distribution.len(), 4);
    assert!((result.total_probability() - 1.0).abs() < 1e-5);
    assert!(result
        .distribution
        .iter()
        .all(|p| (0.0..=1.0).contains(&p.probability)));
    assert_eq!(result.predicted_label, "meningioma");
    assert!((result.confidence - 0.7).abs() < 1e-6);
    assert_eq!(result.probability("meningioma"), Some(result.confidence));

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn three_labels_against_four_outputs_is_shape_mismatch() {
    let path = temp_model_path();
    std::fs::write(&path, "0.25,0.25,0.25,0.25").unwrap();
    let labels = ClassLabels::new(["glioma", "meningioma", "pituitary"]).unwrap();
    let classifier = classifier(file_handle(path.clone(), Arc::default()), labels);

    let err = classifier.classify(&sample_png()).unwrap_err();
    assert!(matches!(
        err,
        ClassifierError::ShapeMismatch {
            expected: 3,
            actual: 4
        }
    ));
    assert!(!err.is_client_error());

    std::fs::remove_file(&path).unwrap();
}

#[test]
fn non_image_bytes_never_reach_the_model() {
    let loads = Arc::new(AtomicUsize::new(0));
    let classifier = classifier(
        file_handle(temp_model_path(), Arc::clone(&loads)),
        ClassLabels::default(),
    );

    let err = classifier.classify(b"GIF89a-but-truncated").unwrap_err();
    assert!(matches!(err, ClassifierError::Decode(_)));
    assert!(err.is_client_error());
    assert_eq!(loads.load(Ordering::SeqCst), 0);
    assert_eq!(classifier.model().state(), LoadState::Uninitialized);
}

#[test]
fn preprocessing_is_deterministic_across_threads() {
    let preprocessor = ImagePreprocessor::default();
    let bytes = Arc::new(sample_png());
    let expected = preprocessor.preprocess(&bytes).unwrap();

    let results: Vec<ImageTensor> = (0..4)
        .map(|_| {
            let bytes = Arc::clone(&bytes);
            thread::spawn(move || preprocessor.preprocess(&bytes).unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|h| h.join().unwrap())
        .collect();

    for tensor in results {
        assert_eq!(tensor, expected);
    }
}
