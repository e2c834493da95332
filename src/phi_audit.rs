// PHI audit: static tests that scan every source file for tracing calls
// carrying patient text, query text, or literature content. Logs may hold
// ids, counts and category names only.
