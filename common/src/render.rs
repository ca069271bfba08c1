use log::debug;

use crate::{
    buttons::ButtonGrid,
    color::Rgb565,
    display::{Display, Font},
    settings::ColorSettings,
    system_info::{InfoChanges, SystemInfo},
};

pub const SPLASH_BACKGROUND: Rgb565 = Rgb565::from_rgb888(70, 130, 180);
pub const URL_BACKGROUND: Rgb565 = Rgb565::from_rgb888(10, 30, 70);
const SPLASH_SUBTITLE: Rgb565 = Rgb565::from_rgb888(128, 128, 128);

pub const PRODUCT_NAME: &str = "Cheap Deck";
pub const PRODUCT_VERSION: &str = "Version 1.1";

fn center(display: &dyn Display) -> (i32, i32) {
    (display.width() / 2, display.height() / 2)
}

pub fn draw_startup(display: &mut dyn Display) {
    let (cx, cy) = center(display);
    display.fill_screen(SPLASH_BACKGROUND);
    display.draw_text(PRODUCT_NAME, cx, cy - 10, Font::Large, Rgb565::BLACK);
    display.draw_text(PRODUCT_VERSION, cx, cy + 25, Font::Small, SPLASH_SUBTITLE);
}

pub fn draw_api_url(display: &mut dyn Display, url: &str) {
    let (cx, cy) = center(display);
    display.fill_screen(URL_BACKGROUND);
    display.draw_text("API URL:", cx, cy - 12, Font::Small, Rgb565::WHITE);
    display.draw_text(url, cx, cy + 12, Font::Small, Rgb565::WHITE);
}

pub fn draw_grid(display: &mut dyn Display, grid: &ButtonGrid, colors: &ColorSettings) {
    debug!("drawing {} buttons", grid.count());
    display.fill_screen(colors.background);
    for (index, button) in grid.active().iter().enumerate() {
        let fill = if button.on {
            colors.active
        } else {
            colors.normal[index]
        };
        display.fill_rect(button.x, button.y, button.size, button.size, fill);
        display.draw_rect(button.x, button.y, button.size, button.size, Rgb565::WHITE);
        display.draw_text(
            &button.label,
            button.x + button.size / 2,
            button.y + button.size / 2,
            Font::Small,
            Rgb565::WHITE,
        );
    }
}

pub fn draw_info(
    display: &mut dyn Display,
    info: &SystemInfo,
    changes: InfoChanges,
    background: Rgb565,
) {
    let width = display.width();
    let (cx, cy) = center(display);

    if changes == InfoChanges::ALL {
        display.fill_screen(background);
    }
    if changes.date {
        display.fill_rect(0, cy - 60, width, 30, background);
        display.draw_text(&info.date, cx, cy - 40, Font::Small, Rgb565::WHITE);
    }
    if changes.time {
        display.fill_rect(0, cy - 30, width, 40, background);
        display.draw_text(&info.time, cx, cy - 10, Font::Large, Rgb565::WHITE);
    }
    if changes.cpu {
        display.fill_rect(0, cy + 5, width, 25, background);
        display.draw_text(
            &format!("CPU: {:.1}%", info.cpu),
            cx,
            cy + 20,
            Font::Small,
            Rgb565::WHITE,
        );
    }
    if changes.ram {
        display.fill_rect(0, cy + 25, width, 25, background);
        display.draw_text(
            &format!("RAM: {:.1}%", info.ram),
            cx,
            cy + 40,
            Font::Small,
            Rgb565::WHITE,
        );
    }
}

pub fn draw_provisioning(
    display: &mut dyn Display,
    ap_ssid: &str,
    ap_address: &str,
    background: Rgb565,
) {
    let (cx, cy) = center(display);
    display.fill_screen(background);
    display.draw_text("AP Mode - Setup WiFi", cx, cy - 30, Font::Small, Rgb565::WHITE);
    display.draw_text("Connect to Wi-Fi:", cx, cy - 8, Font::Small, Rgb565::WHITE);
    display.draw_text(ap_ssid, cx, cy + 10, Font::Large, Rgb565::WHITE);
    display.draw_text(
        &format!("Open http://{ap_address}/"),
        cx,
        cy + 45,
        Font::Small,
        Rgb565::WHITE,
    );
}

pub fn draw_sleep(display: &mut dyn Display) {
    let (cx, cy) = center(display);
    display.fill_screen(Rgb565::BLACK);
    display.draw_text("Sleep mode", cx, cy, Font::Small, Rgb565::WHITE);
}

pub fn draw_blank(display: &mut dyn Display) {
    display.fill_screen(Rgb565::BLACK);
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{
        display::{DrawCall, RecordingDisplay},
        settings::Layout,
    };

    fn sample_info() -> SystemInfo {
        SystemInfo {
            time: "12:34:56".to_string(),
            date: "Mon 01 Jan".to_string(),
            cpu: 12.345,
            ram: 67.0,
        }
    }

    #[test]
    fn grid_uses_active_color_for_toggled_buttons() {
        let mut grid = ButtonGrid::new(300, 32);
        grid.compute_layout(Layout::Grid2x2, 320, 240);
        grid.toggle(1, 1_000);
        let colors = ColorSettings::default();
        let mut display = RecordingDisplay::new(320, 240);

        draw_grid(&mut display, &grid, &colors);

        let fills: Vec<Rgb565> = display
            .calls()
            .iter()
            .filter_map(|call| match call {
                DrawCall::FillRect { color, .. } => Some(*color),
                _ => None,
            })
            .collect();
        assert_eq!(
            fills,
            vec![colors.normal[0], colors.active, colors.normal[2], colors.normal[3]]
        );
        assert_eq!(display.calls()[0], DrawCall::FillScreen(colors.background));
        assert_eq!(display.texts(), vec!["1", "2", "3", "4"]);
    }

    #[test]
    fn full_info_paint_clears_and_draws_every_band() {
        let mut display = RecordingDisplay::new(320, 240);

        draw_info(&mut display, &sample_info(), InfoChanges::ALL, Rgb565::BLACK);

        assert_eq!(display.calls()[0], DrawCall::FillScreen(Rgb565::BLACK));
        assert_eq!(
            display.texts(),
            vec!["Mon 01 Jan", "12:34:56", "CPU: 12.3%", "RAM: 67.0%"]
        );
    }

    #[test]
    fn partial_info_paint_touches_only_changed_band() {
        let mut display = RecordingDisplay::new(320, 240);
        let changes = InfoChanges {
            ram: true,
            ..InfoChanges::default()
        };

        draw_info(&mut display, &sample_info(), changes, Rgb565::BLACK);

        assert_eq!(
            display.calls(),
            &[
                DrawCall::FillRect {
                    x: 0,
                    y: 145,
                    w: 320,
                    h: 25,
                    color: Rgb565::BLACK,
                },
                DrawCall::Text {
                    text: "RAM: 67.0%".to_string(),
                    x: 160,
                    y: 160,
                    font: Font::Small,
                    color: Rgb565::WHITE,
                },
            ]
        );
    }

    #[test]
    fn provisioning_screen_names_the_access_point() {
        let mut display = RecordingDisplay::new(320, 240);

        draw_provisioning(&mut display, "CheapDeck-Setup", "192.168.4.1", URL_BACKGROUND);

        assert_eq!(
            display.texts(),
            vec![
                "AP Mode - Setup WiFi",
                "Connect to Wi-Fi:",
                "CheapDeck-Setup",
                "Open http://192.168.4.1/",
            ]
        );
    }
}
