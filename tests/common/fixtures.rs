//! Export page and export body fixtures

use dw_export::Month;

/// Cookie header used by every mock session
pub const SESSION_COOKIE: &str = "ljsession=v1:u7:s42:abc";

/// Export page as the site serves it: a login form first, then the export form
pub const EXPORT_PAGE: &str = r#"<!DOCTYPE html>
<html><head><title>Export Journal</title></head>
<body>
  <form action="/login" method="post" id="nav-login">
    <input type="text" name="user"><input type="password" name="password">
    <input type="submit" value="Log in">
  </form>
  <form action="/export_do" method="post">
    <input type="hidden" name="lj_form_auth" value="c0:1700000000:42:86400:abc-0">
    <input type="hidden" name="authas" value="exampleuser">
    <select name="what"><option value="journal" selected>Journal entries</option><option value="comment">Comments</option></select>
    <select name="year">
      <option>2006</option><option>2007</option><option>2008</option><option>2009</option>
      <option>2010</option><option selected>2011</option>
    </select>
    <select name="month">
      <option>1</option><option>2</option><option>3</option><option>4</option>
      <option>5</option><option>6</option><option>7</option><option>8</option>
      <option>9</option><option>10</option><option>11</option><option selected>12</option>
    </select>
    <select name="format">
      <option value="csv" selected>Comma-separated values (CSV)</option>
      <option value="xml">XML</option>
    </select>
    <select name="encid"><option value="2" selected>UTF-8</option></select>
    <input type="checkbox" name="field_eventtime" value="1" checked>
    <input type="checkbox" name="field_logtime">
    <input type="checkbox" name="header" checked>
    <input type="submit" value="Proceed...">
  </form>
</body></html>"#;

/// Login page served after a session expires
pub const LOGIN_PAGE: &str = r#"<html><body>
  <form action="/login" method="post"><input name="user"><input type="password" name="password"></form>
</body></html>"#;

/// A small export body for `month`
pub fn export_xml(month: Month) -> String {
    format!(
        "<?xml version=\"1.0\" encoding='utf-8'?>\n<livejournal>\n<entry>\n<itemid>1</itemid>\n\
         <eventtime>{month}-01 12:00:00</eventtime>\n<subject>Entry</subject>\n\
         <event>Hello from {month}</event>\n</entry>\n</livejournal>\n"
    )
}
