// Terminal UI utilities

use colored::Colorize;

use crate::domain::StepResult;
use crate::infrastructure::DependencyReport;

pub fn print_header(title: &str) {
    println!();
    println!(
        "{}",
        "╔════════════════════════════════════════════════════════════╗".bright_blue()
    );
    println!("{}", format!("║  {:<58}║", title).bright_blue());
    println!(
        "{}",
        "╚════════════════════════════════════════════════════════════╝".bright_blue()
    );
    println!();
}

pub fn print_success(message: &str) {
    println!("{}", format!("✅ {}", message).bright_green().bold());
}

pub fn print_error(message: &str) {
    eprintln!("{}", format!("❌ {}", message).bright_red().bold());
}

pub fn print_info(message: &str) {
    println!("{}", format!("ℹ️  {}", message).bright_cyan());
}

pub fn print_warning(message: &str) {
    println!("{}", format!("⚠️  {}", message).bright_yellow());
}

/// One line per executed step, failures with their message
pub fn print_step_results(results: &[StepResult]) {
    println!("Step Results:");
    for result in results {
        let status = if result.success {
            "✅".green()
        } else {
            "❌".red()
        };
        println!(
            "  {} {} {:<20} {:>6.1}s",
            status,
            result.step.emoji(),
            result.step.name(),
            result.duration.as_secs_f64()
        );
        if let Some(message) = &result.message {
            println!("       {}", message.dimmed());
        }
    }
    println!();
}

pub fn print_dependency_report(report: &DependencyReport) {
    for check in &report.checks {
        let status = if check.passed { "✅".green() } else { "❌".red() };
        println!("  {} {}", status, check.description);
    }
    println!();
    if report.passed() {
        print_success("All dependency checks passed");
    } else {
        print_error(&format!("{} dependency check(s) failed", report.failures().count()));
    }
}
