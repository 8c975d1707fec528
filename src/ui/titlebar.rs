use super::{
    AnyElement, AppView, Context, Hsla, InteractiveElement, IntoElement, ParentElement, Styled,
    WINDOW_TITLE, Window, WindowControlArea, div, h_flex, px,
};

pub(super) struct StatusBadge {
    pub icon: &'static str,
    pub text: String,
    pub color: Hsla,
}

impl AppView {
    pub(super) fn render_titlebar(
        &self,
        badges: Vec<StatusBadge>,
        window: &mut Window,
        cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let titlebar_height = px(32.0);

        let badge_row = badges.into_iter().fold(
            h_flex()
                .gap_3()
                .pl(px(80.0))
                .pr_3()
                .h_full()
                .items_center()
                .child(
                    div()
                        .text_sm()
                        .text_color(gpui::rgb(0xe2e8f0))
                        .child(WINDOW_TITLE),
                ),
            |row, badge| {
                row.child(
                    div()
                        .px_2()
                        .py_0p5()
                        .rounded_md()
                        .bg(gpui::rgba(0x00000033))
                        .text_xs()
                        .text_color(badge.color)
                        .child(format!("{} {}", badge.icon, badge.text)),
                )
            },
        );

        h_flex()
            .window_control_area(WindowControlArea::Drag)
            .h(titlebar_height)
            .w_full()
            .items_center()
            .justify_between()
            .bg(gpui::rgb(0x1a2332))
            .child(badge_row)
            .child(self.render_window_controls(window, cx))
            .into_any_element()
    }

    #[cfg(target_os = "macos")]
    fn render_window_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        div().into_any_element()
    }

    #[cfg(not(target_os = "macos"))]
    fn render_window_controls(
        &self,
        _window: &mut Window,
        _cx: &mut Context<'_, Self>,
    ) -> AnyElement {
        let icon_color = gpui::rgb(0xc9d1d9);
        let hover_bg = gpui::rgb(0x1f2428);
        let close_hover_bg = gpui::rgb(0xe81123);

        let control = |id: &'static str, area: WindowControlArea, path: &'static str, hover: gpui::Rgba| {
            div()
                .id(id)
                .size(px(28.0))
                .flex()
                .items_center()
                .justify_center()
                .rounded_md()
                .cursor_pointer()
                .window_control_area(area)
                .hover(move |s| s.bg(hover))
                .child(gpui::svg().size(px(16.0)).path(path).text_color(icon_color))
        };

        h_flex()
            .gap_1()
            .px_2()
            .child(control("window-minimize", WindowControlArea::Min, "M 4,8 H 12", hover_bg))
            .child(control(
                "window-maximize",
                WindowControlArea::Max,
                "M 4,4 H 12 V 12 H 4 Z",
                hover_bg,
            ))
            .child(control(
                "window-close",
                WindowControlArea::Close,
                "M 4,4 L 12,12 M 12,4 L 4,12",
                close_hover_bg,
            ))
            .into_any_element()
    }
}
