//! Object key layout for one project version.
//!
//! Uploaded content lives under the `{project}/{version}/` prefix. Every
//! control object the indexer reads or writes sits next to that prefix as a
//! dot-suffixed sibling, so a listing of the content prefix never returns
//! indexer output.

/// Suffix that marks an uploaded object as part of the aggregate.
pub const JSON_SUFFIX: &str = ".json";

/// Prefix under which the uploaded content of a version lives.
pub fn content_prefix(project: &str, version: &str) -> String {
    format!("{}/{}/", project, version)
}

/// Advisory lease object written by the uploader before this step runs.
pub fn lease(project: &str, version: &str) -> String {
    format!("{}/{}.lease", project, version)
}

/// Optional expiry declaration uploaded next to the content.
pub fn expiry_info(project: &str, version: &str) -> String {
    format!("{}/{}.expiry.json", project, version)
}

/// Metadata document produced for the version.
pub fn version_metadata(project: &str, version: &str) -> String {
    format!("{}/{}.metadata.json", project, version)
}

/// Aggregated contents of every `.json` object under the content prefix.
pub fn aggregate(project: &str, version: &str) -> String {
    format!("{}/{}.index.json", project, version)
}

/// Project-wide permissions document.
pub fn permissions(project: &str) -> String {
    format!("{}/permissions.json", project)
}

/// Pointer to the latest persistent version of the project.
pub fn latest(project: &str) -> String {
    format!("{}/latest.json", project)
}

/// Pointer to the latest version of the project, expiring ones included.
pub fn latest_all(project: &str) -> String {
    format!("{}/latest-all.json", project)
}
