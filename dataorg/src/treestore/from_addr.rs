use url::Url;

use super::{MemoryTreeStore, RedbTreeStore, SledTreeStore, TreeStore};
use crate::Error;

/// Constructs a new instance of a [TreeStore] from an URI.
///
/// The following URIs are supported:
/// - `memory:`
///   Uses a in-memory implementation.
/// - `sled:`
///   Uses a in-memory sled implementation.
/// - `sled:///absolute/path/to/somewhere`
///   Uses sled, using a path on the disk for persistency. Can be only opened
///   from one process at the same time.
/// - `redb:`
///   Uses a in-memory redb implementation.
/// - `redb:///absolute/path/to/somewhere/db.redb`
///   Uses redb, using a path on the disk for persistency.
pub async fn from_addr(uri: &str) -> Result<Box<dyn TreeStore>, Error> {
    let url = Url::parse(uri)
        .map_err(|e| Error::InvalidRequest(format!("unable to parse url: {}", e)))?;

    let tree_store: Box<dyn TreeStore> = match url.scheme() {
        "memory" => {
            // memory doesn't support host or path in the URL.
            if url.has_host() || !url.path().is_empty() {
                return Err(Error::InvalidRequest("invalid url".to_string()));
            }
            Box::<MemoryTreeStore>::default()
        }
        "sled" => {
            // sled doesn't support host, and a path can be provided (otherwise
            // it'll live in memory only).
            if url.has_host() {
                return Err(Error::InvalidRequest("no host allowed".to_string()));
            }

            if url.path() == "/" {
                return Err(Error::InvalidRequest(
                    "cowardly refusing to open / with sled".to_string(),
                ));
            }

            Box::new(if url.path().is_empty() {
                SledTreeStore::new_temporary()?
            } else {
                SledTreeStore::new(url.path())?
            })
        }
        "redb" => {
            if url.has_host() {
                return Err(Error::InvalidRequest("no host allowed".to_string()));
            }

            Box::new(if url.path().is_empty() {
                RedbTreeStore::new_temporary()?
            } else {
                RedbTreeStore::new(url.path().into()).await?
            })
        }
        _ => {
            return Err(Error::InvalidRequest(format!(
                "unknown scheme: {}",
                url.scheme()
            )))
        }
    };
    Ok(tree_store)
}

#[cfg(test)]
mod tests {
    use super::from_addr;
    use lazy_static::lazy_static;
    use rstest::rstest;
    use tempfile::TempDir;

    lazy_static! {
        static ref TMPDIR_SLED_1: TempDir = TempDir::new().unwrap();
        static ref TMPDIR_SLED_2: TempDir = TempDir::new().unwrap();
        static ref TMPDIR_REDB_1: TempDir = TempDir::new().unwrap();
        static ref TMPDIR_REDB_2: TempDir = TempDir::new().unwrap();
    }

    #[rstest]
    /// This uses an unsupported scheme.
    #[case::unsupported_scheme("http://foo.example/test", false)]
    /// This is not an url at all.
    #[case::not_an_url("just some words", false)]
    /// This configures sled in temporary mode.
    #[case::sled_valid_temporary("sled://", true)]
    /// This configures sled with /, which should fail.
    #[case::sled_invalid_root("sled:///", false)]
    /// This configures sled with a host, not path, which should fail.
    #[case::sled_invalid_host("sled://foo.example", false)]
    /// This configures sled with a valid path path, which should succeed.
    #[case::sled_valid_path(&format!("sled://{}", &TMPDIR_SLED_1.path().to_str().unwrap()), true)]
    /// This configures sled with a host, and a valid path path, which should fail.
    #[case::sled_invalid_host_with_valid_path(&format!("sled://foo.example{}", &TMPDIR_SLED_2.path().to_str().unwrap()), false)]
    /// This correctly sets the scheme, and doesn't set a path.
    #[case::memory_valid("memory://", true)]
    /// This sets a memory url host to `foo`
    #[case::memory_invalid_host("memory://foo", false)]
    /// This sets a memory url path to "/", which is invalid.
    #[case::memory_invalid_root_path("memory:///", false)]
    /// This sets a memory url path to "/foo", which is invalid.
    #[case::memory_invalid_root_path_foo("memory:///foo", false)]
    /// This configures redb in temporary mode.
    #[case::redb_valid_temporary("redb://", true)]
    /// This configures redb with /, which should fail.
    #[case::redb_invalid_root("redb:///", false)]
    /// This configures redb with a host, not path, which should fail.
    #[case::redb_invalid_host("redb://foo.example", false)]
    /// This configures redb with a valid path, which should succeed.
    #[case::redb_valid_path(&format!("redb://{}/trees.redb", &TMPDIR_REDB_1.path().to_str().unwrap()), true)]
    /// This configures redb with a host, and a valid path path, which should fail.
    #[case::redb_invalid_host_with_valid_path(&format!("redb://foo.example{}/trees.redb", &TMPDIR_REDB_2.path().to_str().unwrap()), false)]
    #[tokio::test]
    async fn test_from_addr_tokio(#[case] uri_str: &str, #[case] exp_succeed: bool) {
        if exp_succeed {
            from_addr(uri_str).await.expect("should succeed");
        } else {
            assert!(from_addr(uri_str).await.is_err(), "should fail");
        }
    }
}
