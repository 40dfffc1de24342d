use serde::Serialize;

/// Public description of the dataset served by `/dataset/info`.
#[derive(Debug, Serialize)]
pub struct DatasetInfo {
    pub title: &'static str,
    pub description: &'static str,
    pub version: &'static str,
    pub author: &'static str,
    pub citation: &'static str,
    pub file_types: [&'static str; 2],
}

pub const DATASET_INFO: DatasetInfo = DatasetInfo {
    title: "Transportation Infrastructure Defect Dataset",
    description: "Surface defect images of common transportation infrastructure such as \
                  roads and bridges. Every image comes with a JSON file describing the \
                  defect type, location and severity. The dataset is intended as training \
                  and evaluation data for computer vision research, in particular object \
                  detection and image segmentation.",
    version: "1.0.0",
    author: "TIDD maintainers",
    citation: "Please cite the TIDD dataset paper when using this data.",
    file_types: ["JPG Images", "JSON Metadata"],
};

/// Filename the client sees, independent of the temp archive name on disk.
pub const PUBLIC_ARCHIVE_NAME: &str = "TIDD_dataset_v1.zip";
