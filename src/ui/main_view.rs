use super::render_util::fit_within;
use super::titlebar::StatusBadge;
use super::{
    ActiveTheme, AnyElement, AppView, Button, ButtonVariants, Context, FluentBuilder,
    IntoElement, ObjectFit, OutputFormat, ParentElement, Selectable, SharedString, Styled,
    StyledExt, StyledImage, UiEvent, Window, div, h_flex, img, px, v_flex,
};

const PLAYER_MAX_SIZE: (f32, f32) = (640.0, 420.0);
const CONTROL_PANEL_WIDTH: f32 = 360.0;

impl AppView {
    pub(super) fn render_main(
        &mut self,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let theme = cx.theme();
        let badges = vec![
            if self.tools_available {
                StatusBadge {
                    icon: "●",
                    text: "ffmpeg 利用可能".to_string(),
                    color: theme.success,
                }
            } else {
                StatusBadge {
                    icon: "✗",
                    text: "ffmpeg が見つかりません".to_string(),
                    color: theme.danger,
                }
            },
            match self.state.running {
                Some(stage) => StatusBadge {
                    icon: "⟳",
                    text: stage.label().to_string(),
                    color: theme.foreground,
                },
                None => StatusBadge {
                    icon: "○",
                    text: "待機中".to_string(),
                    color: theme.muted_foreground,
                },
            },
        ];

        let controls = self.render_controls(cx);
        let results = self.render_results(cx);
        let titlebar = self.render_titlebar(badges, window, cx);

        v_flex()
            .size_full()
            .bg(gpui::rgb(0x1a2332))
            .child(titlebar)
            .child(
                h_flex()
                    .flex_1()
                    .gap_4()
                    .p_4()
                    .items_start()
                    .child(controls)
                    .child(results),
            )
            .into_any_element()
    }

    fn render_controls(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let running = self.state.is_running();

        let format_row = OutputFormat::ALL.iter().fold(
            h_flex().gap_2().items_center().child(section_label("出力形式:")),
            |row, format| {
                let format = *format;
                row.child(
                    Button::new(SharedString::from(format!("format-{format}")))
                        .outline()
                        .selected(self.state.format == format)
                        .label(format.extension())
                        .on_click(cx.listener(move |this, _, window, cx| {
                            this.dispatch(UiEvent::SelectFormat(format), window, cx)
                        })),
                )
            },
        );

        let status_color = if self.state.status_is_error {
            gpui::rgb(0xfca5a5)
        } else {
            gpui::rgb(0xe2e8f0)
        };

        v_flex()
            .w(px(CONTROL_PANEL_WIDTH))
            .gap_4()
            .p_4()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .text_lg()
                    .font_semibold()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child("🎥 動画ボーン解析ツール"),
            )
            .child(
                v_flex()
                    .gap_2()
                    .child(section_label("動画ファイル選択"))
                    .child(
                        h_flex()
                            .gap_2()
                            .items_center()
                            .child(
                                Button::new(SharedString::from("pick-video"))
                                    .outline()
                                    .label("ファイルを選択...")
                                    .on_click(cx.listener(|this, _, window, cx| {
                                        this.dispatch(UiEvent::PickVideo, window, cx)
                                    })),
                            )
                            .child(
                                div()
                                    .flex_1()
                                    .text_sm()
                                    .text_color(gpui::rgb(0xa0aab8))
                                    .overflow_hidden()
                                    .text_ellipsis()
                                    .whitespace_nowrap()
                                    .child(self.state.video_label()),
                            ),
                    ),
            )
            .child(format_row)
            .child(
                h_flex()
                    .gap_2()
                    .child(
                        Button::new(SharedString::from("analyze"))
                            .primary()
                            .label(if running { "解析中..." } else { "解析開始" })
                            .on_click(cx.listener(|this, _, window, cx| {
                                this.dispatch(UiEvent::Analyze, window, cx)
                            })),
                    )
                    .child(
                        Button::new(SharedString::from("reset"))
                            .outline()
                            .label("クリア")
                            .on_click(cx.listener(|this, _, window, cx| {
                                this.dispatch(UiEvent::Reset, window, cx)
                            })),
                    ),
            )
            .child(
                v_flex()
                    .gap_1()
                    .child(section_label("処理ステータス"))
                    .child(
                        div()
                            .min_h(px(48.0))
                            .p_2()
                            .rounded_md()
                            .border_1()
                            .border_color(gpui::rgb(0x2d3748))
                            .text_sm()
                            .text_color(status_color)
                            .child(self.state.status.clone()),
                    ),
            )
            .into_any_element()
    }

    fn render_results(&self, cx: &mut Context<'_, Self>) -> AnyElement {
        let (frame_w, frame_h) = self
            .frame_size
            .or_else(|| self.playback.as_ref().map(|p| (p.info().width, p.info().height)))
            .unwrap_or((16, 9));
        let (player_w, player_h) =
            fit_within(frame_w, frame_h, PLAYER_MAX_SIZE.0, PLAYER_MAX_SIZE.1);

        let player: AnyElement = match (&self.latest_image, &self.state.playback) {
            (Some(image), _) => img(image.clone())
                .size_full()
                .object_fit(ObjectFit::Contain)
                .into_any_element(),
            (None, Some(_)) => placeholder("再生を準備中..."),
            (None, None) => placeholder("解析結果はまだありません"),
        };

        let video_card = v_flex()
            .gap_2()
            .child(section_label("ランドマーク付き動画"))
            .child(
                div()
                    .w(px(player_w))
                    .h(px(player_h))
                    .overflow_hidden()
                    .rounded_lg()
                    .bg(gpui::rgb(0x000000))
                    .child(player),
            )
            .when(self.playback_ended && self.state.playback.is_some(), |this| {
                this.child(
                    Button::new(SharedString::from("replay"))
                        .ghost()
                        .label("↻ もう一度再生")
                        .on_click(cx.listener(|this, _, window, cx| {
                            this.dispatch(UiEvent::Replay, window, cx)
                        })),
                )
            });

        let has_download = self.state.download.is_some();
        let download_card = v_flex()
            .gap_2()
            .child(section_label("ボーンデータファイル"))
            .child(
                h_flex()
                    .gap_2()
                    .items_center()
                    .child(
                        div()
                            .flex_1()
                            .text_sm()
                            .text_color(gpui::rgb(0xa0aab8))
                            .overflow_hidden()
                            .text_ellipsis()
                            .whitespace_nowrap()
                            .child(if has_download {
                                self.state.download_label()
                            } else {
                                "--".to_string()
                            }),
                    )
                    .when(has_download, |this| {
                        this.child(
                            Button::new(SharedString::from("reveal-data"))
                                .outline()
                                .label("フォルダーを開く")
                                .on_click(cx.listener(|this, _, window, cx| {
                                    this.dispatch(UiEvent::RevealData, window, cx)
                                })),
                        )
                        .child(
                            Button::new(SharedString::from("open-data"))
                                .outline()
                                .label("ファイルを開く")
                                .on_click(cx.listener(|this, _, window, cx| {
                                    this.dispatch(UiEvent::OpenData, window, cx)
                                })),
                        )
                    }),
            );

        v_flex()
            .flex_1()
            .gap_4()
            .p_4()
            .rounded_lg()
            .bg(gpui::rgb(0x0f1419))
            .child(
                div()
                    .text_lg()
                    .font_semibold()
                    .text_color(gpui::rgb(0xe2e8f0))
                    .child("解析結果："),
            )
            .child(video_card)
            .child(download_card)
            .into_any_element()
    }
}

fn section_label(text: &'static str) -> impl IntoElement {
    div().text_xs().text_color(gpui::rgb(0x8b95a5)).child(text)
}

fn placeholder(text: &'static str) -> AnyElement {
    div()
        .size_full()
        .flex()
        .items_center()
        .justify_center()
        .text_sm()
        .text_color(gpui::rgb(0x8b95a5))
        .child(text)
        .into_any_element()
}
