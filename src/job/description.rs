use bon::Builder;
use serde::{Deserialize, Serialize};

/// Numeric knobs of the extraction pipeline.
///
/// Immutable once a job is submitted; ranges are checked by
/// [`validate_job`](super::validate_job) before anything is sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound on extracted frames, `1..=1000`
    #[serde(default = "default_max_frames")]
    pub max_frames: u32,
    #[serde(default = "default_scene_change_threshold")]
    pub scene_change_threshold: f64,
    #[serde(default = "default_quality_threshold")]
    pub quality_threshold: f64,
    #[serde(default = "default_tag_threshold")]
    pub tag_threshold: f64,
    #[serde(default = "default_character_tag_threshold")]
    pub character_tag_threshold: f64,
    #[serde(default = "default_general_tag_threshold")]
    pub general_tag_threshold: f64,
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            max_frames: default_max_frames(),
            scene_change_threshold: default_scene_change_threshold(),
            quality_threshold: default_quality_threshold(),
            tag_threshold: default_tag_threshold(),
            character_tag_threshold: default_character_tag_threshold(),
            general_tag_threshold: default_general_tag_threshold(),
            batch_size: default_batch_size(),
        }
    }
}

impl ProcessingConfig {
    /// Named thresholds, in declaration order.
    pub fn thresholds(&self) -> [(&'static str, f64); 5] {
        [
            ("scene_change_threshold", self.scene_change_threshold),
            ("quality_threshold", self.quality_threshold),
            ("tag_threshold", self.tag_threshold),
            ("character_tag_threshold", self.character_tag_threshold),
            ("general_tag_threshold", self.general_tag_threshold),
        ]
    }
}

fn default_max_frames() -> u32 {
    200
}

fn default_scene_change_threshold() -> f64 {
    0.3
}

fn default_quality_threshold() -> f64 {
    0.6
}

fn default_tag_threshold() -> f64 {
    0.35
}

fn default_character_tag_threshold() -> f64 {
    0.75
}

fn default_general_tag_threshold() -> f64 {
    0.35
}

fn default_batch_size() -> u32 {
    16
}

/// Everything needed to start one processing job
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct JobDescription {
    #[builder(into)]
    pub video_path: String,
    /// Optional reference images; blank entries are dropped at submission
    #[builder(default)]
    pub reference_image_paths: Vec<String>,
    #[builder(into)]
    pub output_directory: String,
    #[builder(into)]
    pub output_name: Option<String>,
    #[builder(default)]
    pub config: ProcessingConfig,
}

impl JobDescription {
    /// Reference paths that are not empty or whitespace-only.
    pub fn non_empty_references(&self) -> Vec<String> {
        self.reference_image_paths
            .iter()
            .filter(|path| !path.trim().is_empty())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let job = JobDescription::builder()
            .video_path("/videos/ep01.mp4")
            .output_directory("/out")
            .build();

        assert!(job.reference_image_paths.is_empty());
        assert!(job.output_name.is_none());
        assert_eq!(job.config, ProcessingConfig::default());
        assert_eq!(job.config.max_frames, 200);
        assert_eq!(job.config.batch_size, 16);
    }

    #[test]
    fn test_non_empty_references() {
        let job = JobDescription::builder()
            .video_path("/videos/ep01.mp4")
            .output_directory("/out")
            .reference_image_paths(vec![
                "/refs/a.png".to_string(),
                "".to_string(),
                "   ".to_string(),
                "/refs/b.jpg".to_string(),
            ])
            .build();

        assert_eq!(job.non_empty_references(), vec!["/refs/a.png", "/refs/b.jpg"]);
    }

    #[test]
    fn test_partial_processing_config_uses_defaults() {
        let config: ProcessingConfig = toml::from_str("max_frames = 50\nbatch_size = 4").unwrap();
        assert_eq!(config.max_frames, 50);
        assert_eq!(config.batch_size, 4);
        assert_eq!(config.character_tag_threshold, 0.75);
    }
}
