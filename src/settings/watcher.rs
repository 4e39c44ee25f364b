use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use notify::{Event, RecommendedWatcher, RecursiveMode, Result as NotifyResult, Watcher};
use crate::settings::{Result, error::SettingsError};
use tracing::{debug, error};

/// 서비스 정의 파일 변경 이벤트 타입
#[derive(Debug, PartialEq, Clone)]
pub enum ConfigEvent {
    /// 파일이 수정됨
    Modified(PathBuf),
    /// 파일이 생성됨 (편집기의 교체 저장 포함)
    Created(PathBuf),
    /// 파일이 삭제됨
    Deleted(PathBuf),
}

impl ConfigEvent {
    /// 재로드가 필요한 이벤트인지 여부
    pub fn needs_reload(&self) -> bool {
        !matches!(self, ConfigEvent::Deleted(_))
    }
}

/// 서비스 정의 파일 감시자
///
/// 편집기가 파일을 교체 저장해도 감시가 끊기지 않도록 상위 디렉토리를 감시하고
/// 대상 파일 이름의 이벤트만 전달합니다.
pub struct ConfigWatcher {
    /// 감시할 파일 경로
    path: PathBuf,
    event_tx: mpsc::Sender<ConfigEvent>,
    event_rx: mpsc::Receiver<ConfigEvent>,
    /// 파일 시스템 감시자
    watcher: Option<RecommendedWatcher>,
}

impl ConfigWatcher {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        let (event_tx, event_rx) = mpsc::channel(32);
        Self {
            path: path.into(),
            event_tx,
            event_rx,
            watcher: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 테스트용 이벤트 송신자 반환
    #[cfg(test)]
    pub fn get_sender(&self) -> mpsc::Sender<ConfigEvent> {
        self.event_tx.clone()
    }

    /// 감시 시작
    pub fn start(&mut self) -> Result<()> {
        let event_tx = self.event_tx.clone();
        let target = self.path.file_name().map(OsString::from).ok_or_else(|| {
            SettingsError::WatchError(format!("파일 경로가 아닙니다: {}", self.path.display()))
        })?;
        let directory = watch_directory(&self.path);

        // notify의 이벤트를 ConfigEvent로 변환하여 채널로 전송하는 핸들러
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: NotifyResult<Event>| {
            match res {
                Ok(event) => {
                    use notify::EventKind::*;

                    for path in event.paths {
                        if path.file_name() != Some(target.as_os_str()) {
                            continue;
                        }
                        let config_event = match event.kind {
                            Modify(_) => ConfigEvent::Modified(path),
                            Create(_) => ConfigEvent::Created(path),
                            Remove(_) => ConfigEvent::Deleted(path),
                            _ => continue,
                        };
                        debug!(event = ?config_event, "서비스 정의 파일 변경 감지");
                        // 수신 측이 밀려 있으면 버림: 재로드는 항상 파일 전체를 다시 읽음
                        let _ = event_tx.try_send(config_event);
                    }
                }
                Err(e) => error!("감시 오류: {}", e),
            }
        }).map_err(|e| SettingsError::WatchError(e.to_string()))?;

        debug!("경로 감시 시작: {}", directory.display());
        watcher.watch(&directory, RecursiveMode::NonRecursive)
            .map_err(|e| SettingsError::WatchError(e.to_string()))?;

        self.watcher = Some(watcher);
        Ok(())
    }

    /// 이벤트 수신 대기
    pub async fn watch(&mut self) -> Option<ConfigEvent> {
        self.event_rx.recv().await
    }

    /// 이미 쌓인 이벤트를 모두 비우고 마지막 이벤트를 반환합니다.
    pub fn drain(&mut self) -> Option<ConfigEvent> {
        let mut last = None;
        while let Ok(event) = self.event_rx.try_recv() {
            last = Some(event);
        }
        last
    }
}

fn watch_directory(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}
