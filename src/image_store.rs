//! In-memory store of decoded images.

use crate::buffer::AnyImageBuffer;
use crate::error::HyperstackError;
use crate::metrics::IMAGES_STORED;

use std::sync::Arc;

use hashbrown::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A map of image identifiers to decoded image buffers.
///
/// Buffers are immutable and shared with request handlers via [Arc], so concurrent requests
/// read the same image without copying it.
pub struct ImageStore {
    /// A [hashbrown::HashMap] for storing the images. A read-write lock synchronises access to
    /// the map, optimised for reads.
    map: RwLock<HashMap<String, Arc<AnyImageBuffer>>>,
}

// FIXME: Images are never evicted, so the store grows with every upload until the process
// restarts.
impl ImageStore {
    /// Create and return an [crate::image_store::ImageStore].
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ImageStore {
            map: RwLock::new(HashMap::new()),
        }
    }

    /// Insert an image and return its newly allocated identifier.
    pub async fn insert(&self, buffer: AnyImageBuffer) -> String {
        let image_id = Uuid::new_v4().to_string();
        let mut map = self.map.write().await;
        map.insert(image_id.clone(), Arc::new(buffer));
        IMAGES_STORED.set(map.len() as i64);
        tracing::info!("Stored image {}", image_id);
        image_id
    }

    /// Get an image from the store.
    ///
    /// # Arguments
    ///
    /// * `image_id`: Identifier returned by [ImageStore::insert]
    pub async fn get(&self, image_id: &str) -> Result<Arc<AnyImageBuffer>, HyperstackError> {
        let map = self.map.read().await;
        map.get(image_id)
            .cloned()
            .ok_or_else(|| HyperstackError::ImageNotFound {
                image_id: image_id.to_string(),
            })
    }

    /// Returns the number of stored images.
    #[cfg(test)]
    pub async fn len(&self) -> usize {
        self.map.read().await.len()
    }

    /// Returns true if no images are stored.
    #[cfg(test)]
    pub async fn is_empty(&self) -> bool {
        self.map.read().await.is_empty()
    }
}
