//! 临时文件空间
//!
//! 所有转换用的中间文件都放在同一个目录下，按任务 ID 命名。
//! `ScratchFile` 析构时删除文件；关闭服务时 `sweep()` 清理所有残留。

use std::collections::HashSet;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::workflow::JobId;

pub struct ScratchSpace {
    root: PathBuf,
    live: Mutex<HashSet<PathBuf>>,
}

impl ScratchSpace {
    pub fn new(root: impl Into<PathBuf>) -> io::Result<Arc<Self>> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        debug!("临时目录: {}", root.display());
        Ok(Arc::new(Self {
            root,
            live: Mutex::new(HashSet::new()),
        }))
    }

    /// 为任务分配一个临时文件路径（文件本身由使用者创建）
    pub fn file(self: &Arc<Self>, job_id: &JobId, label: &str, extension: &str) -> ScratchFile {
        let path = self
            .root
            .join(format!("{}-{}.{}", job_id, label, extension));
        self.lock().insert(path.clone());
        ScratchFile {
            space: Arc::clone(self),
            path,
        }
    }

    /// 当前登记在册的临时文件数
    pub fn live_count(&self) -> usize {
        self.lock().len()
    }

    /// 删除所有登记的临时文件，返回删除数量
    pub fn sweep(&self) -> usize {
        let paths: Vec<PathBuf> = self.lock().drain().collect();
        let removed = paths.iter().filter(|path| remove_quietly(path)).count();
        if removed > 0 {
            info!("🧹 已清理 {} 个残留临时文件", removed);
        }
        removed
    }

    fn discard(&self, path: &Path) {
        if self.lock().remove(path) {
            remove_quietly(path);
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.live.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 删除文件，文件不存在不算错误；返回是否真的删除了文件
fn remove_quietly(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("删除临时文件失败 ({}): {}", path.display(), e);
            false
        }
    }
}

/// 任务独占的临时文件，析构时删除
pub struct ScratchFile {
    space: Arc<ScratchSpace>,
    path: PathBuf,
}

impl ScratchFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        self.space.discard(&self.path);
    }
}
