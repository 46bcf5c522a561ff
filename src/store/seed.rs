use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tokio::fs;

use super::MemoryStore;
use crate::models::{JobTarget, JobTargetStatus, Profile, Resume, Task};

/// 种子文件格式
#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default)]
    profiles: Vec<Profile>,
    #[serde(default)]
    resumes: Vec<SeedResume>,
    #[serde(default)]
    job_targets: Vec<SeedJobTarget>,
    #[serde(default)]
    tasks: Vec<SeedTask>,
}

#[derive(Debug, Deserialize)]
struct SeedResume {
    id: String,
    user_id: String,
    file_name: String,
    /// 相对种子文件所在目录的本地文件
    local_path: PathBuf,
    #[serde(default)]
    storage_path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SeedJobTarget {
    id: String,
    user_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct SeedTask {
    #[serde(default)]
    id: Option<String>,
    user_id: String,
    job_target_id: String,
    resume_id: String,
    #[serde(default)]
    user_inputs: std::collections::HashMap<String, String>,
}

/// 从 TOML 种子文件加载数据到内存存储
///
/// # 返回
/// 返回载入的任务数量
pub async fn load_seed_file(store: &MemoryStore, seed_path: &Path) -> Result<usize> {
    let content = fs::read_to_string(seed_path)
        .await
        .with_context(|| format!("无法读取种子文件: {}", seed_path.display()))?;

    let seed: SeedFile = toml::from_str(&content)
        .with_context(|| format!("无法解析种子文件: {}", seed_path.display()))?;

    let base_dir = seed_path.parent().unwrap_or_else(|| Path::new("."));

    for profile in seed.profiles {
        store.insert_profile(profile)?;
    }

    for resume in seed.resumes {
        let local = base_dir.join(&resume.local_path);
        let bytes = fs::read(&local)
            .await
            .with_context(|| format!("无法读取简历文件: {}", local.display()))?;
        let storage_path = resume
            .storage_path
            .unwrap_or_else(|| format!("{}/resumes/{}", resume.user_id, resume.file_name));
        store.insert_file(storage_path.clone(), bytes)?;
        store.insert_resume(Resume {
            id: resume.id,
            user_id: resume.user_id,
            storage_path,
            file_name: resume.file_name,
        })?;
    }

    for job in seed.job_targets {
        let mut target = JobTarget::new(job.id, job.user_id, job.url);
        target.status = JobTargetStatus::Queued;
        tracing::info!("载入职位: {} ({})", target.normalized_url, target.site_type);
        store.insert_job_target(target)?;
    }

    let task_count = seed.tasks.len();
    for seed_task in seed.tasks {
        let id = seed_task
            .id
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let mut task = Task::queued(id, seed_task.user_id, seed_task.job_target_id, seed_task.resume_id);
        task.user_inputs = seed_task.user_inputs;
        store.insert_task(task)?;
    }

    tracing::info!("✓ 种子文件载入完成，共 {} 个任务", task_count);
    Ok(task_count)
}
