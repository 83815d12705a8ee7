use anyhow::{Context, Result};

/// Load the query list: one domain per line.
///
/// Surrounding whitespace is stripped; empty lines and `#` comments never
/// become queries.
pub fn read_domain_file(path: &str) -> Result<Vec<String>> {
	let content = std::fs::read_to_string(path)
		.with_context(|| format!("cannot read domain list '{}'", path))?;

	let mut domains = Vec::new();
	for line in content.lines() {
		let entry = line.trim();
		if entry.is_empty() || entry.starts_with('#') {
			continue;
		}
		domains.push(entry.to_string());
	}
	Ok(domains)
}

/// Normalize a domain to FQDN form by appending the trailing dot.
pub fn to_fqdn(domain: &str) -> String {
	if domain.ends_with('.') {
		domain.to_string()
	} else {
		format!("{}.", domain)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_to_fqdn_appends_dot() {
		assert_eq!(to_fqdn("example.com"), "example.com.");
	}

	#[test]
	fn test_to_fqdn_keeps_existing_dot() {
		assert_eq!(to_fqdn("example.com."), "example.com.");
	}

	#[test]
	fn test_read_domain_file_skips_blanks_and_comments() {
		let path = std::env::temp_dir()
			.join(format!("massresolve-domains-{}.txt", std::process::id()));
		let mut file = std::fs::File::create(&path).unwrap();
		writeln!(file, "a.test").unwrap();
		writeln!(file).unwrap();
		writeln!(file, "# comment").unwrap();
		writeln!(file, "  b.test  ").unwrap();
		drop(file);

		let domains = read_domain_file(path.to_str().unwrap()).unwrap();
		assert_eq!(domains, vec!["a.test".to_string(), "b.test".to_string()]);

		std::fs::remove_file(path).unwrap();
	}

	#[test]
	fn test_read_domain_file_missing() {
		assert!(read_domain_file("/definitely/not/here.txt").is_err());
	}
}
