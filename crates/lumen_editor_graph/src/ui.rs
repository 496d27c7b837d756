// SPDX-License-Identifier: MIT OR Apache-2.0
//! egui render layer for the graph canvas.
//!
//! Draws the grid, frames, links and nodes, and translates egui pointer and
//! keyboard input into the interaction state machine. All editing logic
//! lives in [`GraphCanvas`] and [`InteractionState`]; this module only
//! paints and forwards events.

use crate::canvas::{Clipboard, GraphCanvas};
use crate::events::EditorCommand;
use crate::frame::{Frame, ResizeHandle, FRAME_HEADER_HEIGHT};
use crate::geometry::{self, Camera};
use crate::interaction::{DragMode, InteractionState, Modifiers, PointerButton};
use crate::port::PortDirection;
use crate::registry::EditorRegistries;
use egui::{Color32, FontId, Pos2, Rect, Rounding, Sense, Stroke, Vec2};

const GRID_COLOR_MINOR: Color32 = Color32::from_rgba_premultiplied(60, 60, 60, 100);
const GRID_COLOR_MAJOR: Color32 = Color32::from_rgba_premultiplied(80, 80, 80, 150);
const NODE_BG: Color32 = Color32::from_rgb(45, 45, 48);
const NODE_BG_SELECTED: Color32 = Color32::from_rgb(60, 70, 90);
const NODE_ROUNDING: f32 = 6.0;
const LINK_THICKNESS: f32 = 2.5;
const MARQUEE_FILL: Color32 = Color32::from_rgba_premultiplied(80, 120, 200, 40);
const MARQUEE_STROKE: Color32 = Color32::from_rgb(120, 160, 255);

/// Interactive widget rendering one [`GraphCanvas`].
pub struct GraphEditorView {
    /// Gesture state machine
    pub interaction: InteractionState,
    clipboard: Clipboard,
    last_pointer: Pos2,
}

impl GraphEditorView {
    /// Create a view with an idle machine and empty clipboard
    pub fn new() -> Self {
        Self {
            interaction: InteractionState::new(),
            clipboard: Clipboard::default(),
            last_pointer: Pos2::ZERO,
        }
    }

    /// Render the editor and process one frame of input
    pub fn ui(
        &mut self,
        ui: &mut egui::Ui,
        canvas: &mut GraphCanvas,
        registries: &EditorRegistries,
    ) {
        let viewport = ui.available_rect_before_wrap();
        let response = ui.allocate_rect(viewport, Sense::click_and_drag());
        let painter = ui.painter_at(viewport);

        self.draw_grid(&painter, viewport, &canvas.camera);
        self.handle_input(ui, &response, viewport, canvas, registries);

        // Paint order: frames under links under nodes.
        let frame_ids: Vec<_> = canvas.frames().map(|f| f.id).collect();
        for frame_id in &frame_ids {
            if let Some(frame) = canvas.frame(*frame_id) {
                if canvas.is_frame_visible(*frame_id) {
                    self.draw_frame(&painter, viewport, canvas, frame);
                }
            }
        }

        self.draw_links(&painter, viewport, canvas);
        self.draw_candidate_link(&painter, viewport, canvas);
        self.draw_nodes(&painter, viewport, canvas, registries);

        if let DragMode::BoxSelecting { start, current, .. } = &self.interaction.mode {
            let camera = canvas.camera;
            let rect = Rect::from_two_pos(
                camera.graph_to_screen(*start, viewport),
                camera.graph_to_screen(*current, viewport),
            );
            painter.rect_filled(rect, 0.0, MARQUEE_FILL);
            painter.rect_stroke(rect, 0.0, Stroke::new(1.0, MARQUEE_STROKE));
        }
    }

    fn handle_input(
        &mut self,
        ui: &egui::Ui,
        response: &egui::Response,
        viewport: Rect,
        canvas: &mut GraphCanvas,
        registries: &EditorRegistries,
    ) {
        let pointer = ui
            .input(|i| i.pointer.hover_pos())
            .unwrap_or(self.last_pointer);
        let screen_delta = pointer - self.last_pointer;
        self.last_pointer = pointer;
        let graph_pos = canvas.camera.screen_to_graph(pointer, viewport);

        let modifiers = ui.input(|i| Modifiers {
            shift: i.modifiers.shift,
            alt: i.modifiers.alt,
            ctrl: i.modifiers.command,
        });

        // Wheel zoom, bounded and recentered on the pointer.
        if viewport.contains(pointer) {
            let scroll = ui.input(|i| i.raw_scroll_delta.y);
            if scroll != 0.0 {
                canvas.camera.zoom_at(graph_pos, 1.0 + scroll * 0.001);
            }
        }

        if response.double_clicked() {
            self.interaction.double_click(canvas, graph_pos);
        } else if response.clicked() {
            self.interaction
                .pointer_down(canvas, graph_pos, PointerButton::Primary, modifiers);
            self.interaction.pointer_up(canvas, graph_pos);
        }

        if response.drag_started_by(egui::PointerButton::Primary) {
            self.interaction
                .pointer_down(canvas, graph_pos, PointerButton::Primary, modifiers);
        } else if response.drag_started_by(egui::PointerButton::Middle) {
            self.interaction
                .pointer_down(canvas, graph_pos, PointerButton::Middle, modifiers);
        }
        if response.dragged() {
            self.interaction.pointer_moved(canvas, graph_pos, screen_delta);
        }
        if response.drag_stopped() {
            self.interaction.pointer_up(canvas, graph_pos);
        }

        ui.input(|i| {
            if i.key_pressed(egui::Key::Escape) {
                self.interaction.cancel();
            }
            if i.key_pressed(egui::Key::Delete) || i.key_pressed(egui::Key::Backspace) {
                canvas.delete_selection(!i.modifiers.alt);
                canvas.request_store();
            }
            if i.modifiers.command && i.key_pressed(egui::Key::C) {
                self.clipboard = canvas.copy_selection();
                tracing::info!("Copied {} nodes to clipboard", self.clipboard.nodes.len());
            }
            if i.modifiers.command && i.key_pressed(egui::Key::V) && !self.clipboard.is_empty() {
                let pasted = canvas.paste(&self.clipboard, registries, graph_pos);
                tracing::info!("Pasted {} nodes from clipboard", pasted.len());
                canvas.request_store();
            }
            if i.modifiers.command && i.key_pressed(egui::Key::Z) {
                let command = if i.modifiers.shift {
                    EditorCommand::Redo
                } else {
                    EditorCommand::Undo
                };
                canvas.events.on_command.notify(&command);
            }
            if i.modifiers.command && i.key_pressed(egui::Key::S) {
                canvas.events.on_command.notify(&EditorCommand::Save);
            }
            if i.key_pressed(egui::Key::F) {
                canvas.zoom_to_fit(viewport);
            }
            if i.key_pressed(egui::Key::L) {
                canvas.auto_arrange();
                canvas.request_store();
            }
        });
    }

    fn draw_grid(&self, painter: &egui::Painter, viewport: Rect, camera: &Camera) {
        let spacing = geometry::GRID_SIZE * camera.zoom;
        let major_spacing = spacing * 5.0;
        let origin = camera.graph_to_screen(Pos2::ZERO, viewport);

        let mut x = origin.x % spacing + viewport.left() - viewport.left() % spacing;
        while x < viewport.right() {
            if x >= viewport.left() {
                painter.line_segment(
                    [Pos2::new(x, viewport.top()), Pos2::new(x, viewport.bottom())],
                    Stroke::new(1.0, GRID_COLOR_MINOR),
                );
            }
            x += spacing;
        }
        let mut y = origin.y % spacing + viewport.top() - viewport.top() % spacing;
        while y < viewport.bottom() {
            if y >= viewport.top() {
                painter.line_segment(
                    [Pos2::new(viewport.left(), y), Pos2::new(viewport.right(), y)],
                    Stroke::new(1.0, GRID_COLOR_MINOR),
                );
            }
            y += spacing;
        }

        let mut x = origin.x % major_spacing + viewport.left() - viewport.left() % major_spacing;
        while x < viewport.right() {
            if x >= viewport.left() {
                painter.line_segment(
                    [Pos2::new(x, viewport.top()), Pos2::new(x, viewport.bottom())],
                    Stroke::new(1.0, GRID_COLOR_MAJOR),
                );
            }
            x += major_spacing;
        }
        let mut y = origin.y % major_spacing + viewport.top() - viewport.top() % major_spacing;
        while y < viewport.bottom() {
            if y >= viewport.top() {
                painter.line_segment(
                    [Pos2::new(viewport.left(), y), Pos2::new(viewport.right(), y)],
                    Stroke::new(1.0, GRID_COLOR_MAJOR),
                );
            }
            y += major_spacing;
        }
    }

    fn draw_frame(
        &self,
        painter: &egui::Painter,
        viewport: Rect,
        canvas: &GraphCanvas,
        frame: &Frame,
    ) {
        let camera = canvas.camera;
        let screen = Rect::from_min_size(
            camera.graph_to_screen(frame.bounds.min, viewport),
            frame.bounds.size() * camera.zoom,
        );
        if !screen.intersects(viewport) {
            return;
        }
        let [r, g, b] = frame.color;
        let selected = canvas.selection.frames.contains(&frame.id);

        let fill = Color32::from_rgba_unmultiplied(r, g, b, if frame.collapsed { 160 } else { 40 });
        painter.rect_filled(screen, NODE_ROUNDING * camera.zoom, fill);

        let header = Rect::from_min_size(
            screen.min,
            Vec2::new(screen.width(), FRAME_HEADER_HEIGHT * camera.zoom),
        );
        painter.rect_filled(
            header,
            Rounding {
                nw: NODE_ROUNDING * camera.zoom,
                ne: NODE_ROUNDING * camera.zoom,
                sw: 0.0,
                se: 0.0,
            },
            Color32::from_rgba_unmultiplied(r, g, b, 200),
        );
        painter.text(
            header.left_center() + Vec2::new(8.0 * camera.zoom, 0.0),
            egui::Align2::LEFT_CENTER,
            &frame.name,
            FontId::proportional(13.0 * camera.zoom),
            Color32::WHITE,
        );

        if !frame.comments.is_empty() && !frame.collapsed {
            painter.text(
                header.left_bottom() + Vec2::new(8.0, 6.0) * camera.zoom,
                egui::Align2::LEFT_TOP,
                &frame.comments,
                FontId::proportional(11.0 * camera.zoom),
                Color32::from_rgb(200, 200, 200),
            );
        }

        if selected {
            painter.rect_stroke(
                screen,
                NODE_ROUNDING * camera.zoom,
                Stroke::new(2.0, Color32::from_rgb(255, 210, 90)),
            );
            if !frame.collapsed {
                for handle in ResizeHandle::ALL {
                    let rect = frame.handle_rect(handle, geometry::HANDLE_SIZE);
                    let screen_rect = Rect::from_center_size(
                        camera.graph_to_screen(rect.center(), viewport),
                        Vec2::splat(geometry::HANDLE_SIZE * camera.zoom.max(0.5)),
                    );
                    painter.rect_filled(screen_rect, 1.0, Color32::from_rgb(255, 210, 90));
                }
            }
        }

        // Frame-port markers on the collapsed band.
        if frame.collapsed {
            for proxy in frame.input_ports.iter().chain(frame.output_ports.iter()) {
                let anchor = camera.graph_to_screen(frame.frame_port_anchor(proxy), viewport);
                let color = canvas
                    .find_port(proxy.inner)
                    .and_then(|(_, p)| p.accepted.iter().next().copied())
                    .map_or(Color32::GRAY, |tag| {
                        let [r, g, b] = tag.color();
                        Color32::from_rgb(r, g, b)
                    });
                painter.circle_filled(anchor, geometry::PORT_RADIUS * camera.zoom, color);
                painter.circle_stroke(
                    anchor,
                    geometry::PORT_RADIUS * camera.zoom,
                    Stroke::new(1.0, Color32::BLACK),
                );
            }
        }
    }

    fn draw_links(&self, painter: &egui::Painter, viewport: Rect, canvas: &GraphCanvas) {
        let camera = canvas.camera;
        for link in canvas.links() {
            if !link.visible {
                continue;
            }
            let Some((from, to)) = geometry::link_endpoints(canvas, link) else {
                continue;
            };
            let selected = canvas.selection.links.contains(&link.id);
            let color = if selected {
                Color32::WHITE
            } else {
                canvas
                    .find_port(link.from_port)
                    .and_then(|(_, p)| p.accepted.iter().next().copied())
                    .map_or(Color32::GRAY, |tag| {
                        let [r, g, b] = tag.color();
                        Color32::from_rgb(r, g, b)
                    })
            };
            self.stroke_curve(painter, viewport, camera, from, to, color);
        }
    }

    fn draw_candidate_link(&self, painter: &egui::Painter, viewport: Rect, canvas: &GraphCanvas) {
        let DragMode::DrawingLink {
            from,
            direction,
            current,
        } = &self.interaction.mode
        else {
            return;
        };
        let Some((node, port)) = canvas.find_port(*from) else {
            return;
        };
        let Some(anchor) = geometry::port_anchor(node, port.id) else {
            return;
        };
        let color = port
            .accepted
            .iter()
            .next()
            .map_or(Color32::GRAY, |tag| {
                let [r, g, b] = tag.color();
                Color32::from_rgb(r, g, b)
            });
        let (a, b) = match direction {
            PortDirection::Output => (anchor, *current),
            PortDirection::Input => (*current, anchor),
        };
        self.stroke_curve(painter, viewport, canvas.camera, a, b, color);
    }

    fn stroke_curve(
        &self,
        painter: &egui::Painter,
        viewport: Rect,
        camera: Camera,
        from: Pos2,
        to: Pos2,
        color: Color32,
    ) {
        let points = geometry::link_path(from, to);
        for pair in points.windows(2) {
            painter.line_segment(
                [
                    camera.graph_to_screen(pair[0], viewport),
                    camera.graph_to_screen(pair[1], viewport),
                ],
                Stroke::new(LINK_THICKNESS * camera.zoom, color),
            );
        }
    }

    fn draw_nodes(
        &self,
        painter: &egui::Painter,
        viewport: Rect,
        canvas: &GraphCanvas,
        registries: &EditorRegistries,
    ) {
        let camera = canvas.camera;
        for node in canvas.nodes() {
            if !canvas.is_node_visible(node.id) {
                continue;
            }
            let rect = geometry::node_rect(node);
            let screen = Rect::from_min_size(
                camera.graph_to_screen(rect.min, viewport),
                rect.size() * camera.zoom,
            );
            if !screen.intersects(viewport) {
                continue;
            }
            let selected = canvas.selection.nodes.contains(&node.id);

            // Shadow, body, header.
            painter.rect_filled(
                screen.translate(Vec2::splat(3.0)),
                NODE_ROUNDING * camera.zoom,
                Color32::from_rgba_unmultiplied(0, 0, 0, 60),
            );
            painter.rect_filled(
                screen,
                NODE_ROUNDING * camera.zoom,
                if selected { NODE_BG_SELECTED } else { NODE_BG },
            );

            let rule = registries.display.rule_for(node.class_name());
            let [r, g, b] = rule.header_color;
            let header = Rect::from_min_size(
                screen.min,
                Vec2::new(screen.width(), geometry::NODE_HEADER_HEIGHT * camera.zoom),
            );
            painter.rect_filled(
                header,
                Rounding {
                    nw: NODE_ROUNDING * camera.zoom,
                    ne: NODE_ROUNDING * camera.zoom,
                    sw: 0.0,
                    se: 0.0,
                },
                Color32::from_rgb(r, g, b),
            );
            let title = rule
                .header_text
                .clone()
                .unwrap_or_else(|| node.display_name());
            painter.text(
                header.center(),
                egui::Align2::CENTER_CENTER,
                title,
                FontId::proportional(12.0 * camera.zoom),
                Color32::WHITE,
            );

            if selected {
                painter.rect_stroke(
                    screen,
                    NODE_ROUNDING * camera.zoom,
                    Stroke::new(2.0, Color32::from_rgb(120, 160, 255)),
                );
            }

            if node.collapsed {
                continue;
            }
            for port in node.ports() {
                let Some(anchor) = geometry::port_anchor(node, port.id) else {
                    continue;
                };
                let anchor = camera.graph_to_screen(anchor, viewport);
                let color = port.accepted.iter().next().map_or(Color32::GRAY, |tag| {
                    let [r, g, b] = tag.color();
                    Color32::from_rgb(r, g, b)
                });
                painter.circle_filled(anchor, geometry::PORT_RADIUS * camera.zoom, color);
                if port.is_connected() {
                    painter.circle_stroke(
                        anchor,
                        geometry::PORT_RADIUS * camera.zoom,
                        Stroke::new(1.5, Color32::WHITE),
                    );
                }
                let (align, offset) = match port.direction {
                    PortDirection::Input => (egui::Align2::LEFT_CENTER, Vec2::new(10.0, 0.0)),
                    PortDirection::Output => (egui::Align2::RIGHT_CENTER, Vec2::new(-10.0, 0.0)),
                };
                painter.text(
                    anchor + offset * camera.zoom,
                    align,
                    &port.name,
                    FontId::proportional(11.0 * camera.zoom),
                    Color32::from_rgb(210, 210, 210),
                );
            }
        }
    }
}

impl Default for GraphEditorView {
    fn default() -> Self {
        Self::new()
    }
}
