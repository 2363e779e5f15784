use anyhow::{Context, Result};
use image::{Rgba, RgbaImage};
use std::cell::Cell;
use std::time::{Duration, Instant};
use tray_icon::{
    menu::{Menu, MenuEvent, MenuItem, PredefinedMenuItem},
    TrayIcon, TrayIconBuilder,
};

use crate::level::{Level, SignalKind};
use crate::sink::NotificationSink;

const ICON_SIZE: u32 = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrayMenuEvent {
    Settings,
    Quit,
}

/// Menu bar stand-in for the HUD overlay: the icon shows the last reported level and
/// falls back to the idle glyph once `hide_after` has passed.
pub struct TrayHud {
    tray_icon: TrayIcon,
    settings_item: MenuItem,
    idle_icon: tray_icon::Icon,
    hide_after: Duration,
    visible_until: Cell<Option<Instant>>,
}

impl TrayHud {
    pub fn new(hide_after: Duration) -> Result<Self> {
        let idle_icon = Self::create_idle_icon(ICON_SIZE)?;

        let menu = Menu::new();
        let settings_item = MenuItem::new("Settings", true, None);

        menu.append(&settings_item)?;
        menu.append(&PredefinedMenuItem::separator())?;
        menu.append(&PredefinedMenuItem::quit(Some("Quit")))?;

        let tray_icon = TrayIconBuilder::new()
            .with_menu(Box::new(menu))
            .with_tooltip("HUD Watch")
            .with_icon(idle_icon.clone())
            .build()
            .context("Failed to create tray icon")?;

        Ok(TrayHud {
            tray_icon,
            settings_item,
            idle_icon,
            hide_after,
            visible_until: Cell::new(None),
        })
    }

    fn create_idle_icon(size: u32) -> Result<tray_icon::Icon> {
        let mut img = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
        let white = Rgba([255, 255, 255, 255]);

        // Empty level frame
        Self::draw_frame(&mut img, 4, 22, 24, 6, white);

        tray_icon::Icon::from_rgba(img.into_raw(), size, size)
            .context("Failed to create idle icon")
    }

    fn create_level_icon(size: u32, kind: SignalKind, level: Level) -> Result<tray_icon::Icon> {
        let mut img = RgbaImage::from_pixel(size, size, Rgba([0, 0, 0, 0]));
        let white = Rgba([255, 255, 255, 255]);

        match kind {
            SignalKind::Volume => {
                // Speaker body and cone
                Self::draw_rect(&mut img, 6, 7, 4, 6, white);
                Self::draw_rect(&mut img, 10, 5, 2, 10, white);
                Self::draw_rect(&mut img, 12, 3, 2, 14, white);
                // Sound waves
                Self::draw_rect(&mut img, 17, 8, 2, 4, white);
                Self::draw_rect(&mut img, 21, 6, 2, 8, white);
            }
            SignalKind::Brightness => {
                // Sun
                Self::draw_circle(&mut img, 16, 10, 5, white);
                Self::draw_rect(&mut img, 15, 0, 2, 3, white);
                Self::draw_rect(&mut img, 7, 9, 2, 2, white);
                Self::draw_rect(&mut img, 23, 9, 2, 2, white);
            }
        }

        // Level bar: frame plus fill proportional to the level
        Self::draw_frame(&mut img, 4, 22, 24, 6, white);
        let fill = (level.value() * 22.0).round() as u32;
        Self::draw_rect(&mut img, 5, 23, fill, 4, white);

        tray_icon::Icon::from_rgba(img.into_raw(), size, size)
            .context("Failed to create level icon")
    }

    fn draw_circle(img: &mut RgbaImage, cx: u32, cy: u32, radius: u32, color: Rgba<u8>) {
        let width = img.width();
        let height = img.height();
        let r_sq = (radius * radius) as i32;

        for dy in -(radius as i32)..=(radius as i32) {
            for dx in -(radius as i32)..=(radius as i32) {
                if dx * dx + dy * dy <= r_sq {
                    let px = (cx as i32 + dx) as u32;
                    let py = (cy as i32 + dy) as u32;
                    if px < width && py < height {
                        img.put_pixel(px, py, color);
                    }
                }
            }
        }
    }

    fn draw_rect(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
        let width = img.width();
        let height = img.height();

        for py in y..(y + h).min(height) {
            for px in x..(x + w).min(width) {
                img.put_pixel(px, py, color);
            }
        }
    }

    fn draw_frame(img: &mut RgbaImage, x: u32, y: u32, w: u32, h: u32, color: Rgba<u8>) {
        Self::draw_rect(img, x, y, w, 1, color);
        Self::draw_rect(img, x, y + h - 1, w, 1, color);
        Self::draw_rect(img, x, y, 1, h, color);
        Self::draw_rect(img, x + w - 1, y, 1, h, color);
    }

    /// Revert to the idle icon once the indicator has been up long enough
    pub fn tick(&self, now: Instant) {
        if let Some(until) = self.visible_until.get() {
            if now >= until {
                let _ = self.tray_icon.set_icon(Some(self.idle_icon.clone()));
                if let Err(e) = self.tray_icon.set_tooltip(Some("HUD Watch")) {
                    tracing::debug!("Failed to reset tooltip: {}", e);
                }
                self.visible_until.set(None);
            }
        }
    }

    pub fn poll_event(&self) -> Option<TrayMenuEvent> {
        if let Ok(event) = MenuEvent::receiver().try_recv() {
            let id = event.id();

            if id == self.settings_item.id() {
                return Some(TrayMenuEvent::Settings);
            } else if id.0 == "quit" {
                return Some(TrayMenuEvent::Quit);
            }
        }
        None
    }
}

impl NotificationSink for TrayHud {
    fn report(&self, kind: SignalKind, value: Level) {
        tracing::debug!("HUD: {} {}", kind, value);

        match Self::create_level_icon(ICON_SIZE, kind, value) {
            Ok(icon) => {
                let _ = self.tray_icon.set_icon(Some(icon));
            }
            Err(e) => {
                tracing::warn!("Failed to draw {} icon: {}", kind, e);
                return;
            }
        }
        if let Err(e) = self.tray_icon.set_tooltip(Some(format!("{} {}", kind, value))) {
            tracing::debug!("Failed to set tooltip: {}", e);
        }
        self.visible_until.set(Some(Instant::now() + self.hide_after));
    }
}
