use std::collections::BTreeSet;
use std::io;

use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};

use crate::config::RuntimeConfig;
use crate::host::{World, WorldHost};
use crate::vm::{ExecState, Exit, Program, Vm};

/// Most instructions a single `c` runs before handing control back.
const CONTINUE_LIMIT: u64 = 1_000_000;

/// Debugger state.
pub struct Debugger {
    vm: Vm<WorldHost>,
    program: Program,
    /// World to restore on restart
    world: World,
    breakpoints: BTreeSet<usize>,
    /// Whether the debugger is running
    running: bool,
    /// Command input buffer
    input: String,
    status: String,
}

impl Debugger {
    pub fn new(program: Program, config: RuntimeConfig, world: World) -> Self {
        let mut vm = Vm::with_config(WorldHost::new(world.clone()), config);
        vm.load(program.clone());
        Self {
            vm,
            program,
            world,
            breakpoints: BTreeSet::new(),
            running: true,
            input: String::new(),
            status: "Ready. Type 'h' for help.".to_string(),
        }
    }

    /// Execute one instruction.
    fn step(&mut self) {
        if self.vm.is_finished() {
            self.status = self.finished_status();
            return;
        }
        let progress = self.vm.step();
        self.status = match progress.exit {
            Exit::Halted | Exit::Faulted(_) => self.finished_status(),
            _ => format!("ip: {}, stack size: {}", self.vm.ip(), self.vm.stack().len()),
        };
    }

    /// Continue execution until a breakpoint, the end, or the slice limit.
    fn continue_exec(&mut self) {
        if self.vm.is_finished() {
            self.status = self.finished_status();
            return;
        }
        let mut executed = 0;
        while executed < CONTINUE_LIMIT {
            let progress = self.vm.step();
            executed += progress.executed;
            if matches!(progress.exit, Exit::Halted | Exit::Faulted(_)) {
                self.status = self.finished_status();
                return;
            }
            if self.breakpoints.contains(&self.vm.ip()) {
                self.status = format!("Breakpoint hit at {:04}", self.vm.ip());
                return;
            }
        }
        self.status = format!("Paused after {} instructions", executed);
    }

    fn restart(&mut self) {
        let host = self.vm.host_mut();
        host.world = self.world.clone();
        host.reset_log();
        self.vm.load(self.program.clone());
        self.status = "Restarted.".to_string();
    }

    fn finished_status(&self) -> String {
        match self.vm.state() {
            ExecState::Faulted(fault) => format!("Faulted: {}", fault),
            _ => format!("Program halted after {} steps.", self.vm.steps()),
        }
    }

    /// Process a command.
    fn process_command(&mut self, cmd: &str) {
        let parts: Vec<&str> = cmd.split_whitespace().collect();
        if parts.is_empty() {
            return;
        }

        match parts[0] {
            "s" | "step" => self.step(),
            "c" | "continue" => self.continue_exec(),
            "b" | "d" => {
                let Some(pc) = parts.get(1).and_then(|p| p.parse::<usize>().ok()) else {
                    self.status = format!("Usage: {} <instruction>", parts[0]);
                    return;
                };
                if parts[0] == "b" {
                    self.breakpoints.insert(pc);
                    self.status = format!("Breakpoint set at {:04}", pc);
                } else {
                    self.breakpoints.remove(&pc);
                    self.status = format!("Breakpoint deleted at {:04}", pc);
                }
            }
            "bl" => {
                let bps: Vec<String> = self.breakpoints.iter().map(|pc| pc.to_string()).collect();
                self.status = format!("Breakpoints: {}", bps.join(", "));
            }
            "r" | "restart" => self.restart(),
            "gc" => {
                let freed = self.vm.collect_garbage();
                self.status = format!("Collected {} array(s)", freed);
            }
            "q" | "quit" => {
                self.running = false;
            }
            "h" | "help" => {
                self.status =
                    "Commands: s(tep) c(ontinue) b <n> d <n> bl r(estart) gc q(uit)".to_string();
            }
            _ => {
                self.status = format!("Unknown command: {}", parts[0]);
            }
        }
    }

    /// Run the debugger TUI.
    pub fn run(&mut self) -> io::Result<()> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;

        while self.running {
            terminal.draw(|frame| self.ui(frame))?;

            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                match key.code {
                    KeyCode::Enter => {
                        let cmd = std::mem::take(&mut self.input);
                        self.process_command(&cmd);
                    }
                    KeyCode::Char(c) => self.input.push(c),
                    KeyCode::Backspace => {
                        self.input.pop();
                    }
                    KeyCode::Esc => self.running = false,
                    _ => {}
                }
            }
        }

        disable_raw_mode()?;
        terminal.backend_mut().execute(LeaveAlternateScreen)?;
        Ok(())
    }

    fn ui(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(10),   // Program
                Constraint::Length(8), // Stack + Heap
                Constraint::Length(5), // Host
                Constraint::Length(3), // Status
                Constraint::Length(3), // Input
            ])
            .split(frame.area());

        let ip = self.vm.ip();
        let items: Vec<ListItem> = self
            .program
            .iter()
            .enumerate()
            .map(|(pc, op)| {
                let bp = if self.breakpoints.contains(&pc) { "●" } else { " " };
                let marker = if pc == ip { "▶" } else { " " };
                let style = if pc == ip {
                    Style::default().bg(Color::DarkGray)
                } else {
                    Style::default()
                };
                ListItem::new(format!("{}{}{:04} │ {}", bp, marker, pc, op)).style(style)
            })
            .collect();
        let listing =
            List::new(items).block(Block::default().title("Program").borders(Borders::ALL));
        let mut list_state = ListState::default().with_selected(Some(ip));
        frame.render_stateful_widget(listing, chunks[0], &mut list_state);

        let info_chunks = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(chunks[1]);

        let stack_text: Vec<String> = self
            .vm
            .stack()
            .as_slice()
            .iter()
            .rev()
            .take(6)
            .map(|v| v.to_string())
            .collect();
        let stack = Paragraph::new(stack_text.join("\n"))
            .block(Block::default().title("Stack (top first)").borders(Borders::ALL));
        frame.render_widget(stack, info_chunks[0]);

        let heap = self.vm.heap();
        let mut heap_text = vec![format!(
            "{} live, {} elements, {} gc cycles",
            heap.live_count(),
            heap.element_count(),
            self.vm.gc_stats().cycles
        )];
        heap_text.extend(heap.iter().take(5).map(|(r, obj)| {
            let elems: Vec<String> = obj.data.iter().take(8).map(|v| v.to_string()).collect();
            format!("{} {}[{}] {}", r, obj.elem.name(), obj.len(), elems.join(" "))
        }));
        let heap_view = Paragraph::new(heap_text.join("\n"))
            .block(Block::default().title("Heap").borders(Borders::ALL));
        frame.render_widget(heap_view, info_chunks[1]);

        let host = self.vm.host();
        let events: Vec<String> = host.events().iter().rev().take(2).map(|e| e.to_string()).collect();
        let host_text = format!(
            "mana {} | output: {}\n{}",
            host.world.mana,
            host.transcript(),
            events.join("\n")
        );
        let host_view =
            Paragraph::new(host_text).block(Block::default().title("Host").borders(Borders::ALL));
        frame.render_widget(host_view, chunks[2]);

        let status = Paragraph::new(self.status.as_str())
            .block(Block::default().title("Status").borders(Borders::ALL));
        frame.render_widget(status, chunks[3]);

        let input = Paragraph::new(format!("(debug) {}", self.input))
            .block(Block::default().title("Command").borders(Borders::ALL));
        frame.render_widget(input, chunks[4]);
    }
}

/// Run the debugger on a program.
pub fn run_debugger(program: Program, config: RuntimeConfig, world: World) -> io::Result<()> {
    let mut debugger = Debugger::new(program, config, world);
    debugger.run()
}
