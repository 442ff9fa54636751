use crate::build::artifact::{ArtifactWrite, ArtifactWriter};
use crate::build::incremental::{hash_bytes, AssetEntry, SkipPolicy};
use crate::error::BuildError;
use crate::model::Theme;
use crate::storage::ArtifactCategory;
use crate::theme::{normalize_asset_path, AssetResolver};
use chrono::{DateTime, Utc};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// 资源复制统计
#[derive(Debug, Default)]
pub struct AssetReport {
    pub built: usize,
    pub skipped: usize,
    /// 输出路径 → 清单条目（含跳过的资源）
    pub entries: Vec<(String, AssetEntry)>,
    /// 单个资源的读取错误
    pub errors: Vec<Arc<BuildError>>,
}

/// 复制所有启用主题声明的资源到 `{output_dir}/assets/`
///
/// 整个阶段共享一个截止时间；超时返回 `AssetTimeout`，`report` 保留截止前完成的部分。
pub async fn copy_assets(
    resolver: &dyn AssetResolver,
    writer: &ArtifactWriter,
    themes: &[Theme],
    output_dir: &Path,
    timeout: Duration,
    skip: SkipPolicy<'_>,
    now: DateTime<Utc>,
    report: &mut AssetReport,
) -> Result<(), BuildError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let copy = copy_all(resolver, writer, themes, output_dir, skip, now, report);
    match tokio::time::timeout_at(deadline, copy).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("资源复制超过 {:?}，已完成 {} 个", timeout, report.built);
            Err(BuildError::AssetTimeout {
                timeout,
                copied: report.built,
            })
        }
    }
}

async fn copy_all(
    resolver: &dyn AssetResolver,
    writer: &ArtifactWriter,
    themes: &[Theme],
    output_dir: &Path,
    skip: SkipPolicy<'_>,
    now: DateTime<Utc>,
    report: &mut AssetReport,
) -> Result<(), BuildError> {
    for theme in themes {
        tracing::debug!("复制主题 {} 的 {} 个资源", theme.name, theme.assets.len());
        for raw in theme.assets.iter() {
            let asset_error = |source| {
                Arc::new(BuildError::Asset {
                    theme: theme.name.clone(),
                    path: raw.to_owned(),
                    source,
                })
            };

            let relative = match normalize_asset_path(raw) {
                Ok(path) => path,
                Err(e) => {
                    tracing::warn!("跳过非法资源路径 {}：{}", raw, e);
                    report.errors.push(asset_error(e));
                    continue;
                }
            };
            let data = match resolver.open(theme, raw).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!("读取主题 {} 的资源 {} 失败：{}", theme.name, raw, e);
                    report.errors.push(asset_error(e));
                    continue;
                }
            };

            let hash = hash_bytes(&data);
            let output = Path::new("assets").join(&relative).to_string_lossy().replace('\\', "/");
            let entry = AssetEntry {
                hash: hash.clone(),
                updated_at: now,
            };

            if skip.should_skip_asset(&output, &hash) {
                tracing::debug!("资源未变化，跳过 {}", output);
                report.skipped += 1;
                report.entries.push((output, entry));
                continue;
            }

            let artifact = ArtifactWrite::new(output_dir.join(&output), data, ArtifactCategory::Asset)
                .checksum(hash)
                .meta("theme", theme.name.clone());
            writer.write_file(artifact).await?;
            report.built += 1;
            report.entries.push((output, entry));
        }
    }
    Ok(())
}
