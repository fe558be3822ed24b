//! Input Staging (§4.C): uploads the files the compiler staged locally (user
//! uploads and any mask/base merge product) to the chosen worker node, then
//! patches the compiled prompt-graph in place with the worker-returned
//! remote reference. Grounded on `original_source/app/services/
//! comfy_prepare_prompt.py`'s upload step, composed here with
//! `forge_compiler::staging`'s `FileStore` seam and `forge_compiler::mask`'s
//! pixel work.

use std::sync::Arc;

use forge_compiler::staging::{upload_name, FileStore};
use forge_compiler::{mask, CompileError, CompileOutput, MaskMerger, StagingError};
use serde_json::Value;

use crate::worker_client::WorkerHttpClient;

/// `MaskMerger` backed by a `FileStore`: reads the base/mask bytes the
/// compiler names, merges the mask's inverted luminance into the base's
/// alpha channel (§4.B step 4, S5), writes the result back under a fresh
/// path, and returns that path as the new `uploaded_files` entry.
pub struct FileStoreMaskMerger {
    store: Arc<dyn FileStore>,
}

impl FileStoreMaskMerger {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self { store }
    }
}

impl MaskMerger for FileStoreMaskMerger {
    fn merge(&self, base_path: &str, mask_path: &str) -> Result<String, CompileError> {
        let base = self.store.read(base_path).map_err(|e| CompileError::MaskMerge(e.to_string()))?;
        let mask_bytes = self.store.read(mask_path).map_err(|e| CompileError::MaskMerge(e.to_string()))?;
        let merged =
            mask::merge_mask_into_alpha(&base, &mask_bytes).map_err(|e| CompileError::MaskMerge(e.to_string()))?;

        let merged_path = format!("merged/{}.png", uuid::Uuid::new_v4());
        self.store.write(&merged_path, &merged).map_err(|e| CompileError::MaskMerge(e.to_string()))?;
        Ok(merged_path)
    }
}

/// Uploads every file the compiler staged to `base_url` and rewrites
/// `compiled`'s `prompt`/`uploaded_files` in place with the worker's remote
/// reference, using `compiled.file_bindings` to find where each upload
/// key's value landed in the final named-input prompt graph.
pub async fn stage_uploaded_files(
    worker_client: &WorkerHttpClient,
    base_url: &str,
    store: &dyn FileStore,
    compiled: &mut CompileOutput,
) -> Result<(), StagingError> {
    let keys: Vec<String> = compiled.uploaded_files.keys().cloned().collect();
    for key in keys {
        let local_path = compiled.uploaded_files.get(&key).cloned().expect("key from its own keys()");
        let bytes = store.read(&local_path)?;
        let name = upload_name(&key, &local_path);
        let remote_ref = worker_client.upload_image(base_url, &name, bytes, "", true).await?;

        if let Some((node_id, field)) = compiled.file_bindings.get(&key).cloned() {
            if let Some(inputs) =
                compiled.prompt.get_mut(&node_id).and_then(|n| n.get_mut("inputs")).and_then(|v| v.as_object_mut())
            {
                inputs.insert(field, Value::String(remote_ref.clone()));
            }
        }
        compiled.uploaded_files.insert(key, remote_ref);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forge_compiler::staging::LocalFileStore;

    #[test]
    fn merger_round_trips_through_a_file_store() {
        use image::{ImageBuffer, Rgb};

        let dir = std::env::temp_dir().join(format!("forge-core-mask-merge-test-{}", std::process::id()));
        let store: Arc<dyn FileStore> = Arc::new(LocalFileStore::new(&dir));

        let solid = |gray: u8| {
            let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_fn(4, 4, |_, _| Rgb([gray, gray, gray]));
            let mut buf = Vec::new();
            img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png).unwrap();
            buf
        };
        store.write("A.png", &solid(200)).unwrap();
        store.write("M.png", &solid(0)).unwrap();

        let merger = FileStoreMaskMerger::new(store);
        let merged_path = merger.merge("A.png", "M.png").unwrap();
        assert!(merged_path.starts_with("merged/"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
