use super::{
    ActiveTheme, AnyElement, AppView, Context, DownloadMessage, DownloadState, EstimatorBackend,
    IntoElement, ModelDownloadEvent, ModelKind, ParentElement, Styled, StyledExt, Tag, div, h_flex,
    thread, v_flex,
};
use crossbeam_channel::Sender;

impl AppView {
    pub(super) fn poll_download_events(&mut self, state: &mut DownloadState) {
        while let Ok(msg) = self.download_rx.try_recv() {
            match msg {
                DownloadMessage::Event(ModelDownloadEvent::AlreadyPresent { model }) => {
                    state.message = format!("{} モデルは取得済みです", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Started { model, total }) => {
                    state.current = Some(model);
                    state.downloaded = 0;
                    state.total = total;
                    state.message = format!("{} モデルをダウンロード中...", model.label());
                }
                DownloadMessage::Event(ModelDownloadEvent::Progress {
                    model,
                    downloaded,
                    total,
                }) => {
                    state.current = Some(model);
                    state.downloaded = downloaded;
                    state.total = total;
                }
                DownloadMessage::Event(ModelDownloadEvent::Finished { model }) => {
                    if !state.ready.contains(&model) {
                        state.ready.push(model);
                    }
                    state.message = format!("{} モデルの準備ができました", model.label());
                }
                DownloadMessage::Error(err) => {
                    state.error = Some(err);
                    state.message = "モデルのダウンロードに失敗しました".to_string();
                }
            }
        }
    }

    pub(super) fn render_download_view(
        &self,
        state: &DownloadState,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let bar = progress_bar_string(state.downloaded, state.total);
        let detail = match (state.current, state.total) {
            (Some(model), Some(total)) if total > 0 => format!(
                "{}: {} / {} KB",
                model.label(),
                state.downloaded / 1024,
                total / 1024
            ),
            (Some(model), _) => format!("{}: {} KB", model.label(), state.downloaded / 1024),
            (None, _) => format!("{} / {} モデル", state.ready.len(), ModelKind::ALL.len()),
        };

        let (status_icon, status_text, status_color) = if state.error.is_some() {
            ("✗", "モデル取得失敗", theme.danger)
        } else if state.finished() {
            ("✓", "モデル準備完了", theme.success)
        } else {
            ("⟳", "モデル準備中", theme.foreground)
        };

        let model_rows = ModelKind::ALL.iter().fold(v_flex().gap_1(), |rows, model| {
            let ready = state.ready.contains(model);
            rows.child(
                div()
                    .text_sm()
                    .text_color(if ready {
                        theme.success
                    } else {
                        theme.muted_foreground
                    })
                    .child(format!("{} {}", if ready { "●" } else { "○" }, model.label())),
            )
        });

        let mut container = v_flex()
            .gap_3()
            .p_6()
            .rounded_lg()
            .border_1()
            .border_color(theme.border)
            .bg(theme.group_box)
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .text_color(status_color)
                            .font_semibold()
                            .child(format!("{status_icon} {status_text}")),
                    )
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.muted_foreground)
                            .child("姿勢推定モデルを準備しています"),
                    ),
            )
            .child(model_rows)
            .child(
                div()
                    .px_3()
                    .py_2()
                    .rounded_md()
                    .border_1()
                    .border_color(theme.border)
                    .bg(theme.muted)
                    .font_family(theme.mono_font_family.clone())
                    .text_color(theme.foreground)
                    .child(bar),
            )
            .child(div().text_sm().text_color(theme.muted_foreground).child(detail))
            .child(div().text_color(theme.foreground).child(state.message.clone()));

        if let Some(err) = &state.error {
            container = container.child(Tag::danger().rounded_full().child(format!("エラー: {err}")));
        }

        v_flex()
            .size_full()
            .items_center()
            .justify_center()
            .bg(theme.background)
            .child(container)
            .into_any_element()
    }
}

pub(super) fn spawn_model_download(
    backend: EstimatorBackend,
    tx: Sender<DownloadMessage>,
) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        let result = backend.ensure_models(|event| {
            let _ = tx.send(DownloadMessage::Event(event));
        });

        if let Err(err) = result {
            log::error!("failed to prepare pose models: {err:?}");
            let _ = tx.send(DownloadMessage::Error(format!("{err:#}")));
        }
    })
}

fn progress_bar_string(downloaded: u64, total: Option<u64>) -> String {
    const BAR_LEN: usize = 30;
    match total {
        Some(total) if total > 0 => {
            let pct = (downloaded as f64 / total as f64).clamp(0.0, 1.0);
            let filled = ((pct * BAR_LEN as f64).round() as usize).min(BAR_LEN);
            format!(
                "[{}{}] {:>5.1}%",
                "=".repeat(filled),
                " ".repeat(BAR_LEN - filled),
                pct * 100.0
            )
        }
        _ => {
            let width = ((downloaded / (64 * 1024)) as usize % BAR_LEN) + 1;
            format!("[{:-<width$}] サイズ不明", ">")
        }
    }
}
